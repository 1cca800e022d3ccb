//! Gap-limit address discovery (spec §4.4 step 1).
//!
//! This is the pure state machine only: it tracks `highestChecked` /
//! `highestUsed` and tells the caller which batch to derive and query next.
//! The caller (in `wallet-indexer`) owns deriving addresses via
//! [`crate::deriver::AddressDeriver`] and querying the `address` table —
//! this module has no opinion on either.

/// Driver for the gap-limit scan. Construct with `maxGap`, feed it the
/// result of each address batch via [`GapScanner::record_batch`], and stop
/// once [`GapScanner::is_done`] returns `true`.
#[derive(Debug, Clone)]
pub struct GapScanner {
    max_gap: u32,
    highest_checked: i64,
    highest_used: i64,
}

impl GapScanner {
    pub fn new(max_gap: u32) -> Self {
        assert!(max_gap > 0, "maxGap must be positive");
        Self {
            max_gap,
            highest_checked: -1,
            highest_used: -1,
        }
    }

    /// First index of the next batch to derive (`highestChecked + 1`).
    pub fn next_batch_start(&self) -> u32 {
        (self.highest_checked + 1) as u32
    }

    /// Size of the next batch to derive (`maxGap` addresses).
    pub fn batch_len(&self) -> u32 {
        self.max_gap
    }

    /// Record the outcome of one batch: the indices, within the batch just
    /// derived, that were found with `transactions > 0` in the `address`
    /// table. Advances `highestChecked` by `maxGap` regardless of outcome.
    pub fn record_batch<I: IntoIterator<Item = u32>>(&mut self, used_indices: I) {
        for idx in used_indices {
            self.highest_used = self.highest_used.max(idx as i64);
        }
        self.highest_checked += self.max_gap as i64;
    }

    /// Terminate when `highestUsed + maxGap <= highestChecked` (spec §4.4).
    pub fn is_done(&self) -> bool {
        self.highest_used + self.max_gap as i64 <= self.highest_checked
    }

    /// Size of the final subscribed window: `highestUsed + maxGap + 1`
    /// addresses (indices `0..=highestUsed+maxGap`). Only meaningful once
    /// [`GapScanner::is_done`] is `true`.
    pub fn window_size(&self) -> u32 {
        (self.highest_used + self.max_gap as i64 + 1) as u32
    }

    pub fn highest_used(&self) -> i64 {
        self.highest_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// No addresses ever used: terminates after the first batch, window is
    /// exactly `maxGap` addresses (indices 0..maxGap-1).
    #[test]
    fn empty_wallet_terminates_after_one_batch() {
        let mut scanner = GapScanner::new(20);
        assert_eq!(scanner.next_batch_start(), 0);
        assert_eq!(scanner.batch_len(), 20);
        scanner.record_batch(std::iter::empty());
        assert!(scanner.is_done());
        assert_eq!(scanner.window_size(), 20);
    }

    /// S5 from spec §8: addresses at indices 0 and 2 used, maxGap=20.
    #[test]
    fn s5_scenario_window_is_23() {
        let mut scanner = GapScanner::new(20);
        scanner.record_batch([0u32, 2u32]);
        assert!(!scanner.is_done()); // highest_used(2) + 20 = 22 > highest_checked(19)
        scanner.record_batch(std::iter::empty());
        assert!(scanner.is_done());
        assert_eq!(scanner.highest_used(), 2);
        assert_eq!(scanner.window_size(), 23);
    }

    /// P5: a used index right at the edge of a batch forces another round.
    #[test]
    fn used_address_at_edge_forces_another_batch() {
        let mut scanner = GapScanner::new(5);
        // batch 0: indices 0..4, index 4 used
        scanner.record_batch([4u32]);
        assert!(!scanner.is_done()); // highest_used(4) + 5 = 9 > highest_checked(4)
        assert_eq!(scanner.next_batch_start(), 5);
        // batch 1: indices 5..9, none used
        scanner.record_batch(std::iter::empty());
        assert!(scanner.is_done()); // 4 + 5 = 9 <= 9
        assert_eq!(scanner.window_size(), 10);
    }

    #[test]
    fn window_bounds_hold_property_p5() {
        // P5: highestUsed < window size <= highestUsed + maxGap + 1
        let mut scanner = GapScanner::new(10);
        scanner.record_batch([7u32]);
        while !scanner.is_done() {
            scanner.record_batch(std::iter::empty());
        }
        let window = scanner.window_size();
        assert!((scanner.highest_used() as i64) < window as i64);
        assert!(window as i64 <= scanner.highest_used() + 10 + 1);
    }
}
