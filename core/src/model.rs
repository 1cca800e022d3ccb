//! Domain types shared by the projector and the storage layer.
//!
//! Nothing here touches a database or a socket — these are the plain
//! records and maps the algorithms in [`crate::lock`] and [`crate::gap`]
//! operate over, and the shapes `wallet-indexer` persists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Native token id, per the wire default in the spec (`"00"`).
pub const NATIVE_TOKEN: &str = "00";

/// A token identifier. Wrapped rather than a bare `String` so the native
/// default is applied once, at the event-decoding boundary, instead of
/// being re-derived every time a map is keyed on token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl Default for TokenId {
    fn default() -> Self {
        TokenId(NATIVE_TOKEN.to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        TokenId(s.to_string())
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        TokenId(s)
    }
}

/// Decoded recipient of a transaction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedOutput {
    pub address: String,
    pub timelock: Option<u32>,
}

/// A transaction output as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    #[serde(default)]
    pub token: TokenId,
    pub decoded: DecodedOutput,
}

/// A transaction input, denormalized from the UTXO it spends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_id: String,
    pub index: u32,
    pub value: u64,
    #[serde(default)]
    pub token: TokenId,
    pub address: String,
    #[serde(default)]
    pub timelock: Option<u32>,
}

/// A full transaction or block event as delivered by the upstream transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEvent {
    pub version: u8,
    pub tx_id: String,
    pub timestamp: u32,
    #[serde(default)]
    pub height: Option<u32>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// The block-version code. Any event carrying it is a block, per spec §4.1.
pub const BLOCK_VERSION: u8 = 0;

impl TxEvent {
    pub fn is_block(&self) -> bool {
        self.version == BLOCK_VERSION
    }
}

/// Primary key of a UTXO row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoKey {
    pub tx_id: String,
    pub index: u32,
}

/// A UTXO row: `utxo(tx_id, index)` from §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoRecord {
    pub token_id: TokenId,
    pub address: String,
    pub value: u64,
    pub timelock: Option<u32>,
    pub heightlock: Option<u32>,
}

/// Signed delta applied to one `(address|wallet, tokenId)` balance cell.
///
/// Both fields are signed: a spend contributes a negative `unlocked`, a
/// lock-release contributes `+unlocked`/`-locked` of equal magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub unlocked: i64,
    pub locked: i64,
}

impl BalanceDelta {
    pub fn unlocked(value: i64) -> Self {
        Self {
            unlocked: value,
            locked: 0,
        }
    }

    pub fn locked(value: i64) -> Self {
        Self {
            unlocked: 0,
            locked: value,
        }
    }

    /// Net signed contribution to `address_tx_history.balance` / wallet
    /// history, per §4.3 step 3 and §9.
    pub fn signed_total(&self) -> i64 {
        self.unlocked + self.locked
    }

    pub fn add(&mut self, other: BalanceDelta) {
        self.unlocked += other.unlocked;
        self.locked += other.locked;
    }
}

/// A stored balance cell, always non-negative per invariant I1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub unlocked: i64,
    pub locked: i64,
}

/// `address → tokenId → delta`, built by [`crate::lock`] classification and
/// consumed by the address-store layer (spec §4.1 step 1, §4.2 `release`).
pub type AddressDeltaMap = HashMap<String, HashMap<TokenId, BalanceDelta>>;

/// Accumulate `delta` into `map[address][token]`.
pub fn accumulate(map: &mut AddressDeltaMap, address: &str, token: &TokenId, delta: BalanceDelta) {
    map.entry(address.to_string())
        .or_default()
        .entry(token.clone())
        .or_insert_with(BalanceDelta::default)
        .add(delta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_defaults_to_native() {
        assert_eq!(TokenId::default().0, "00");
    }

    #[test]
    fn accumulate_sums_same_cell() {
        let mut map = AddressDeltaMap::new();
        let token = TokenId::from("00");
        accumulate(&mut map, "addr1", &token, BalanceDelta::unlocked(10));
        accumulate(&mut map, "addr1", &token, BalanceDelta::unlocked(-3));
        let cell = map["addr1"][&token];
        assert_eq!(cell.unlocked, 7);
        assert_eq!(cell.locked, 0);
    }
}
