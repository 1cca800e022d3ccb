//! Storage seam: `AddressStore` and `WalletStore` (spec §4.3, §4.5).
//!
//! Two implementations live here: [`postgres`] against the seven tables in
//! §3, and [`memory`] for tests that need no live database. The projector
//! and materializer depend only on the traits in this module.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;
use wallet_index_core::{AddressDeltaMap, Balance, BalanceDelta, TokenId, UtxoKey, UtxoRecord};

use crate::error::IndexerError;

pub type StoreResult<T> = Result<T, IndexerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Creating,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub struct WalletRecord {
    pub id: String,
    pub xpubkey: String,
    pub status: WalletStatus,
    pub max_gap: u32,
    pub created_at: u32,
    pub ready_at: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AddressRow {
    pub address: String,
    pub wallet_id: Option<String>,
    pub index: Option<u32>,
    pub transactions: u32,
}

#[derive(Debug, Clone)]
pub struct WalletAddress {
    pub address: String,
    pub index: u32,
    pub transactions: u32,
}

#[derive(Debug, Clone)]
pub struct BalanceRow {
    pub token_id: TokenId,
    pub balance: Balance,
    pub transactions: u32,
}

#[derive(Debug, Clone)]
pub struct TxHistoryEntry {
    pub tx_id: String,
    pub timestamp: u32,
    pub balance: i64,
}

/// A claimed address's wallet identity, as returned by
/// [`AddressStore::lookup_wallets_by_addresses`].
#[derive(Debug, Clone)]
pub struct WalletClaim {
    pub wallet_id: String,
    pub xpubkey: String,
    pub max_gap: u32,
}

/// Per-token aggregate used while seeding `wallet_balance` (spec §4.4 step 4).
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressAggregate {
    pub balance: Balance,
    pub history_balance: i64,
    pub distinct_tx_count: u32,
}

/// Mutates `utxo`, `address`, `address_balance`, `address_tx_history` (§4.3).
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn insert_utxo(&self, key: UtxoKey, record: UtxoRecord) -> StoreResult<()>;

    /// Deletes the UTXO a spending input references. Missing key is a hard
    /// error per §4.1 step 2.
    async fn delete_utxo(&self, key: &UtxoKey) -> StoreResult<UtxoRecord>;

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &AddressDeltaMap,
    ) -> StoreResult<()>;

    async fn apply_unlock(&self, deltas: &AddressDeltaMap) -> StoreResult<()>;

    async fn find_utxos_maturing_at(
        &self,
        height: u32,
        now: u32,
    ) -> StoreResult<Vec<(UtxoKey, UtxoRecord)>>;

    async fn lookup_wallets_by_addresses(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, WalletClaim>>;

    async fn get_address(&self, address: &str) -> StoreResult<Option<AddressRow>>;

    /// Derived addresses already present in `address`, queried as one batch
    /// for the gap scanner (§4.4 step 1).
    async fn get_addresses_batch(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, AddressRow>>;

    async fn claim_address(&self, address: &str, wallet_id: &str, index: u32) -> StoreResult<()>;

    async fn insert_claimed_address(
        &self,
        address: &str,
        wallet_id: &str,
        index: u32,
    ) -> StoreResult<()>;

    async fn get_wallet_addresses(&self, wallet_id: &str) -> StoreResult<Vec<WalletAddress>>;

    /// Aggregates address_balance and address_tx_history over `addresses`,
    /// grouped by token, for materialization seeding (§4.4 steps 3-4).
    async fn aggregate_for_window(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<TokenId, AddressAggregate>>;

    /// One row per (tx_id, token_id) across `addresses`, grouped and summed,
    /// for `wallet_tx_history` seeding (§4.4 step 3).
    async fn grouped_tx_history(
        &self,
        addresses: &[String],
    ) -> StoreResult<Vec<(TokenId, String, i64, u32)>>;
}

/// The `projected_tx` ledger (spec §9, resolved in `SPEC_FULL.md`): makes
/// `TxProjector::project` fully idempotent rather than merely duplicate-
/// rejecting, by recording every tx_id it has successfully committed.
#[async_trait]
pub trait ProjectionLedger: Send + Sync {
    async fn is_already_projected(&self, tx_id: &str) -> StoreResult<bool>;
    async fn mark_projected(&self, tx_id: &str, height: Option<u32>) -> StoreResult<()>;
}

/// Mutates `wallet`, `wallet_balance`, `wallet_tx_history` (§4.5).
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Inserts a `creating` wallet row. Fails `WalletAlreadyCreated` if
    /// `xpubkey` already has a wallet, in any status (§5).
    async fn register(&self, xpubkey: &str, max_gap: u32, created_at: u32) -> StoreResult<String>;

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()>;

    async fn apply_unlock(
        &self,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()>;

    async fn seed_balance(
        &self,
        wallet_id: &str,
        token_id: &TokenId,
        balance: Balance,
        transactions: u32,
    ) -> StoreResult<()>;

    async fn seed_tx_history(
        &self,
        wallet_id: &str,
        rows: &[(TokenId, String, i64, u32)],
    ) -> StoreResult<()>;

    async fn mark_ready(&self, wallet_id: &str, ready_at: u32) -> StoreResult<()>;
    async fn mark_error(&self, wallet_id: &str) -> StoreResult<()>;

    async fn get_wallet(&self, wallet_id: &str) -> StoreResult<Option<WalletRecord>>;
    async fn get_wallet_by_xpubkey(&self, xpubkey: &str) -> StoreResult<Option<WalletRecord>>;

    async fn get_wallet_balances(
        &self,
        wallet_id: &str,
        token_id: Option<&TokenId>,
    ) -> StoreResult<Vec<BalanceRow>>;

    async fn get_wallet_tx_history(
        &self,
        wallet_id: &str,
        token_id: &TokenId,
        skip: u32,
        count: u32,
    ) -> StoreResult<Vec<TxHistoryEntry>>;
}
