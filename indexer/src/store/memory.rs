//! In-memory backend for both [`super::AddressStore`] and
//! [`super::WalletStore`], used by the scenario tests in `tests/scenarios.rs`
//! and available for local runs without Postgres. A single `Mutex`-guarded
//! struct backs both traits since nothing here ever awaits while the lock is
//! held — every operation is synchronous bookkeeping over `HashMap`s.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use wallet_index_core::{AddressDeltaMap, Balance, BalanceDelta, TokenId, UtxoKey, UtxoRecord};

use super::{
    AddressAggregate, AddressRow, AddressStore, BalanceRow, ProjectionLedger, StoreResult,
    TxHistoryEntry, WalletAddress, WalletClaim, WalletRecord, WalletStatus, WalletStore,
};
use crate::error::IndexerError;

#[derive(Default)]
struct Inner {
    utxos: HashMap<UtxoKey, UtxoRecord>,
    addresses: HashMap<String, AddressRow>,
    address_balances: HashMap<(String, TokenId), Balance>,
    address_tx_history: Vec<(String, String, TokenId, i64, u32)>,
    wallets: HashMap<String, WalletRecord>,
    wallets_by_xpubkey: HashMap<String, String>,
    wallet_balances: HashMap<(String, TokenId), (Balance, u32)>,
    wallet_tx_history: Vec<(String, String, TokenId, i64, u32)>,
    next_wallet_id: u64,
    projected_tx: HashMap<String, Option<u32>>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressStore for MemStore {
    async fn insert_utxo(&self, key: UtxoKey, record: UtxoRecord) -> StoreResult<()> {
        self.inner.lock().unwrap().utxos.insert(key, record);
        Ok(())
    }

    async fn delete_utxo(&self, key: &UtxoKey) -> StoreResult<UtxoRecord> {
        self.inner
            .lock()
            .unwrap()
            .utxos
            .remove(key)
            .ok_or_else(|| {
                IndexerError::InconsistentChain(format!(
                    "input references unknown utxo {}:{}",
                    key.tx_id, key.index
                ))
            })
    }

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &AddressDeltaMap,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (address, by_token) in deltas {
            inner
                .addresses
                .entry(address.clone())
                .or_insert_with(|| AddressRow {
                    address: address.clone(),
                    wallet_id: None,
                    index: None,
                    transactions: 0,
                })
                .transactions += 1;

            for (token, delta) in by_token {
                let key = (address.clone(), token.clone());
                let existed = inner.address_balances.contains_key(&key);
                let cell = inner.address_balances.entry(key).or_insert(Balance {
                    unlocked: 0,
                    locked: 0,
                });
                if existed {
                    cell.unlocked += delta.unlocked;
                    cell.locked += delta.locked;
                } else {
                    cell.unlocked = delta.unlocked.max(0);
                    cell.locked = delta.locked.max(0);
                }
                inner.address_tx_history.push((
                    address.clone(),
                    tx_id.to_string(),
                    token.clone(),
                    delta.signed_total(),
                    timestamp,
                ));
            }
        }
        Ok(())
    }

    async fn apply_unlock(&self, deltas: &AddressDeltaMap) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (address, by_token) in deltas {
            for (token, delta) in by_token {
                let cell = inner
                    .address_balances
                    .entry((address.clone(), token.clone()))
                    .or_insert(Balance {
                        unlocked: 0,
                        locked: 0,
                    });
                cell.unlocked += delta.unlocked;
                cell.locked += delta.locked;
            }
        }
        Ok(())
    }

    async fn find_utxos_maturing_at(
        &self,
        height: u32,
        now: u32,
    ) -> StoreResult<Vec<(UtxoKey, UtxoRecord)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .utxos
            .iter()
            .filter(|(_, record)| {
                record.heightlock == Some(height)
                    && record.timelock.map_or(true, |t| t <= now)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn lookup_wallets_by_addresses(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, WalletClaim>> {
        let inner = self.inner.lock().unwrap();
        let mut out = HashMap::new();
        for address in addresses {
            if let Some(row) = inner.addresses.get(address) {
                if let Some(wallet_id) = &row.wallet_id {
                    if let Some(wallet) = inner.wallets.get(wallet_id) {
                        out.insert(
                            address.clone(),
                            WalletClaim {
                                wallet_id: wallet_id.clone(),
                                xpubkey: wallet.xpubkey.clone(),
                                max_gap: wallet.max_gap,
                            },
                        );
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_address(&self, address: &str) -> StoreResult<Option<AddressRow>> {
        Ok(self.inner.lock().unwrap().addresses.get(address).cloned())
    }

    async fn get_addresses_batch(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, AddressRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(addresses
            .iter()
            .filter_map(|a| inner.addresses.get(a).map(|row| (a.clone(), row.clone())))
            .collect())
    }

    async fn claim_address(&self, address: &str, wallet_id: &str, index: u32) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .addresses
            .get_mut(address)
            .ok_or_else(|| IndexerError::InconsistentChain(format!("no such address {address}")))?;
        row.wallet_id = Some(wallet_id.to_string());
        row.index = Some(index);
        Ok(())
    }

    async fn insert_claimed_address(
        &self,
        address: &str,
        wallet_id: &str,
        index: u32,
    ) -> StoreResult<()> {
        self.inner.lock().unwrap().addresses.insert(
            address.to_string(),
            AddressRow {
                address: address.to_string(),
                wallet_id: Some(wallet_id.to_string()),
                index: Some(index),
                transactions: 0,
            },
        );
        Ok(())
    }

    async fn get_wallet_addresses(&self, wallet_id: &str) -> StoreResult<Vec<WalletAddress>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<WalletAddress> = inner
            .addresses
            .values()
            .filter(|row| row.wallet_id.as_deref() == Some(wallet_id))
            .map(|row| WalletAddress {
                address: row.address.clone(),
                index: row.index.unwrap_or(0),
                transactions: row.transactions,
            })
            .collect();
        rows.sort_by_key(|r| r.index);
        Ok(rows)
    }

    async fn aggregate_for_window(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<TokenId, AddressAggregate>> {
        let inner = self.inner.lock().unwrap();
        let address_set: std::collections::HashSet<&String> = addresses.iter().collect();
        let mut out: HashMap<TokenId, AddressAggregate> = HashMap::new();

        for ((address, token), balance) in &inner.address_balances {
            if address_set.contains(address) {
                let entry = out.entry(token.clone()).or_default();
                entry.balance.unlocked += balance.unlocked;
                entry.balance.locked += balance.locked;
            }
        }

        let mut seen_tx: HashMap<TokenId, std::collections::HashSet<String>> = HashMap::new();
        for (address, tx_id, token, balance, _) in &inner.address_tx_history {
            if address_set.contains(address) {
                let entry = out.entry(token.clone()).or_default();
                entry.history_balance += balance;
                seen_tx.entry(token.clone()).or_default().insert(tx_id.clone());
            }
        }
        for (token, txs) in seen_tx {
            out.entry(token).or_default().distinct_tx_count = txs.len() as u32;
        }

        Ok(out)
    }

    async fn grouped_tx_history(
        &self,
        addresses: &[String],
    ) -> StoreResult<Vec<(TokenId, String, i64, u32)>> {
        let inner = self.inner.lock().unwrap();
        let address_set: std::collections::HashSet<&String> = addresses.iter().collect();
        let mut grouped: HashMap<(TokenId, String), (i64, u32)> = HashMap::new();
        for (address, tx_id, token, balance, timestamp) in &inner.address_tx_history {
            if address_set.contains(address) {
                let entry = grouped
                    .entry((token.clone(), tx_id.clone()))
                    .or_insert((0, *timestamp));
                entry.0 += balance;
                entry.1 = *timestamp;
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((token, tx_id), (balance, timestamp))| (token, tx_id, balance, timestamp))
            .collect())
    }
}

#[async_trait]
impl ProjectionLedger for MemStore {
    async fn is_already_projected(&self, tx_id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().projected_tx.contains_key(tx_id))
    }

    async fn mark_projected(&self, tx_id: &str, height: Option<u32>) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .projected_tx
            .insert(tx_id.to_string(), height);
        Ok(())
    }
}

#[async_trait]
impl WalletStore for MemStore {
    async fn register(&self, xpubkey: &str, max_gap: u32, created_at: u32) -> StoreResult<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.wallets_by_xpubkey.contains_key(xpubkey) {
            return Err(IndexerError::WalletAlreadyCreated(xpubkey.to_string()));
        }
        let id = format!("wallet-{}", inner.next_wallet_id);
        inner.next_wallet_id += 1;
        inner.wallets.insert(
            id.clone(),
            WalletRecord {
                id: id.clone(),
                xpubkey: xpubkey.to_string(),
                status: WalletStatus::Creating,
                max_gap,
                created_at,
                ready_at: None,
            },
        );
        inner.wallets_by_xpubkey.insert(xpubkey.to_string(), id.clone());
        Ok(id)
    }

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (wallet_id, by_token) in deltas {
            for (token, delta) in by_token {
                let key = (wallet_id.clone(), token.clone());
                let existed = inner.wallet_balances.contains_key(&key);
                let entry = inner
                    .wallet_balances
                    .entry(key)
                    .or_insert((Balance { unlocked: 0, locked: 0 }, 0));
                if existed {
                    entry.0.unlocked += delta.unlocked;
                    entry.0.locked += delta.locked;
                } else {
                    entry.0.unlocked = delta.unlocked.max(0);
                    entry.0.locked = delta.locked.max(0);
                }
                entry.1 += 1;
                inner.wallet_tx_history.push((
                    wallet_id.clone(),
                    tx_id.to_string(),
                    token.clone(),
                    delta.signed_total(),
                    timestamp,
                ));
            }
        }
        Ok(())
    }

    async fn apply_unlock(
        &self,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (wallet_id, by_token) in deltas {
            for (token, delta) in by_token {
                let entry = inner
                    .wallet_balances
                    .entry((wallet_id.clone(), token.clone()))
                    .or_insert((Balance { unlocked: 0, locked: 0 }, 0));
                entry.0.unlocked += delta.unlocked;
                entry.0.locked += delta.locked;
            }
        }
        Ok(())
    }

    async fn seed_balance(
        &self,
        wallet_id: &str,
        token_id: &TokenId,
        balance: Balance,
        transactions: u32,
    ) -> StoreResult<()> {
        self.inner.lock().unwrap().wallet_balances.insert(
            (wallet_id.to_string(), token_id.clone()),
            (balance, transactions),
        );
        Ok(())
    }

    async fn seed_tx_history(
        &self,
        wallet_id: &str,
        rows: &[(TokenId, String, i64, u32)],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (token, tx_id, balance, timestamp) in rows {
            inner.wallet_tx_history.push((
                wallet_id.to_string(),
                tx_id.clone(),
                token.clone(),
                *balance,
                *timestamp,
            ));
        }
        Ok(())
    }

    async fn mark_ready(&self, wallet_id: &str, ready_at: u32) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| IndexerError::WalletNotFound(wallet_id.to_string()))?;
        wallet.status = WalletStatus::Ready;
        wallet.ready_at = Some(ready_at);
        Ok(())
    }

    async fn mark_error(&self, wallet_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(wallet) = inner.wallets.get_mut(wallet_id) {
            wallet.status = WalletStatus::Error;
        }
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &str) -> StoreResult<Option<WalletRecord>> {
        Ok(self.inner.lock().unwrap().wallets.get(wallet_id).cloned())
    }

    async fn get_wallet_by_xpubkey(&self, xpubkey: &str) -> StoreResult<Option<WalletRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .wallets_by_xpubkey
            .get(xpubkey)
            .and_then(|id| inner.wallets.get(id))
            .cloned())
    }

    async fn get_wallet_balances(
        &self,
        wallet_id: &str,
        token_id: Option<&TokenId>,
    ) -> StoreResult<Vec<BalanceRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .wallet_balances
            .iter()
            .filter(|((w, t), _)| w == wallet_id && token_id.map_or(true, |want| want == t))
            .map(|((_, t), (balance, transactions))| BalanceRow {
                token_id: t.clone(),
                balance: *balance,
                transactions: *transactions,
            })
            .collect())
    }

    async fn get_wallet_tx_history(
        &self,
        wallet_id: &str,
        token_id: &TokenId,
        skip: u32,
        count: u32,
    ) -> StoreResult<Vec<TxHistoryEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<TxHistoryEntry> = inner
            .wallet_tx_history
            .iter()
            .filter(|(w, _, t, _, _)| w == wallet_id && t == token_id)
            .map(|(_, tx_id, _, balance, timestamp)| TxHistoryEntry {
                tx_id: tx_id.clone(),
                timestamp: *timestamp,
                balance: *balance,
            })
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows
            .into_iter()
            .skip(skip as usize)
            .take(count as usize)
            .collect())
    }
}
