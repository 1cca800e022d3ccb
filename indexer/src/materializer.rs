//! `WalletMaterializer`: gap-limit scan, wallet claim, and balance/history
//! seeding (spec §4.4).

use std::sync::Arc;

use wallet_index_core::{AddressDeriver, GapScanner};

use crate::error::IndexerError;
use crate::store::{AddressStore, StoreResult, WalletStore};

pub struct WalletMaterializer<S, D> {
    store: Arc<S>,
    deriver: Arc<D>,
}

impl<S, D> WalletMaterializer<S, D>
where
    S: AddressStore + WalletStore,
    D: AddressDeriver,
{
    pub fn new(store: Arc<S>, deriver: Arc<D>) -> Self {
        Self { store, deriver }
    }

    /// Synchronously creates the `creating` wallet row; the caller decides
    /// whether to run [`Self::materialize`] inline or dispatch it (§4.4,
    /// §5).
    pub async fn register(&self, xpubkey: &str, max_gap: u32, now: u32) -> StoreResult<String> {
        WalletStore::register(&*self.store, xpubkey, max_gap, now).await
    }

    pub async fn materialize(
        &self,
        wallet_id: &str,
        xpubkey: &str,
        max_gap: u32,
        now: u32,
    ) -> StoreResult<()> {
        let window = self.scan_window(xpubkey, max_gap).await?;
        let window_addresses: Vec<String> = window.iter().map(|(a, _)| a.clone()).collect();

        self.claim_window(wallet_id, &window).await?;

        let history_rows = self.store.grouped_tx_history(&window_addresses).await?;
        self.store.seed_tx_history(wallet_id, &history_rows).await?;

        let aggregates = self.store.aggregate_for_window(&window_addresses).await?;
        for (token, aggregate) in &aggregates {
            let total = aggregate.balance.unlocked + aggregate.balance.locked;
            if total != aggregate.history_balance {
                self.store.mark_error(wallet_id).await?;
                return Err(IndexerError::InconsistentChain(format!(
                    "wallet {wallet_id} token {token}: balance {total} does not match history sum {}",
                    aggregate.history_balance
                )));
            }
            self.store
                .seed_balance(wallet_id, token, aggregate.balance, aggregate.distinct_tx_count)
                .await?;
        }

        self.store.mark_ready(wallet_id, now).await?;
        crate::metrics::inc_materializations_run();
        Ok(())
    }

    /// Gap-limit scan (§4.4 step 1): derive batches of `maxGap` addresses,
    /// query which are already referenced, and keep going until
    /// [`GapScanner::is_done`].
    async fn scan_window(&self, xpubkey: &str, max_gap: u32) -> StoreResult<Vec<(String, u32)>> {
        let mut scanner = GapScanner::new(max_gap);
        let mut derived: Vec<(String, u32)> = Vec::new();

        loop {
            let start = scanner.next_batch_start();
            let len = scanner.batch_len();
            let batch = self.deriver.derive(xpubkey, start, len);
            let batch_addresses: Vec<String> = batch.iter().map(|(a, _)| a.clone()).collect();
            let existing = self.store.get_addresses_batch(&batch_addresses).await?;

            let used_indices: Vec<u32> = batch
                .iter()
                .filter(|(address, _)| {
                    existing.get(address).map(|row| row.transactions > 0).unwrap_or(false)
                })
                .map(|(_, index)| *index)
                .collect();

            derived.extend(batch);
            scanner.record_batch(used_indices);
            if scanner.is_done() {
                break;
            }
        }

        let window_size = scanner.window_size();
        Ok(derived.into_iter().filter(|(_, index)| *index < window_size).collect())
    }

    /// §4.4 step 2: claim existing address rows, insert new ones.
    async fn claim_window(&self, wallet_id: &str, window: &[(String, u32)]) -> StoreResult<()> {
        let window_addresses: Vec<String> = window.iter().map(|(a, _)| a.clone()).collect();
        let existing = self.store.get_addresses_batch(&window_addresses).await?;

        for (address, index) in window {
            if existing.contains_key(address) {
                self.store.claim_address(address, wallet_id, *index).await?;
            } else {
                self.store.insert_claimed_address(address, wallet_id, *index).await?;
            }
        }
        Ok(())
    }
}
