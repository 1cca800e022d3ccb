//! Postgres-backed `AddressStore` / `WalletStore`, grounded on the teacher's
//! `payout/scheduler.rs`: `deadpool_postgres` for pooling, `CREATE TABLE IF
//! NOT EXISTS` schema init run once at startup, and the same
//! `INSERT ... ON CONFLICT ... DO UPDATE SET col = table.col + EXCLUDED.col`
//! upsert idiom that file uses for `pending_payouts.amount`.
//!
//! One divergence from that idiom: balance columns here must clamp to zero
//! on first insert but add the *unclamped* signed delta on conflict (spec
//! §4.3), so `EXCLUDED.unlocked` can't be reused for the update arm the way
//! the teacher reuses it for a column that's never negative — the raw delta
//! is bound as a second parameter instead.
//!
//! Per §5, a reader that observes a new `address_tx_history` row must also
//! observe the matching `address_balance` update, so every write here
//! updates balance before history for the same (tx, address, token).

use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use uuid::Uuid;
use wallet_index_core::{AddressDeltaMap, Balance, BalanceDelta, TokenId, UtxoKey, UtxoRecord};

use super::{
    AddressAggregate, AddressRow, AddressStore, BalanceRow, ProjectionLedger, StoreResult,
    TxHistoryEntry, WalletAddress, WalletClaim, WalletRecord, WalletStatus, WalletStore,
};
use crate::error::IndexerError;

fn storage_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::StorageUnavailable(e.to_string())
}

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS utxo (
                tx_id TEXT NOT NULL,
                output_index INTEGER NOT NULL,
                token_id TEXT NOT NULL,
                address TEXT NOT NULL,
                value BIGINT NOT NULL,
                timelock BIGINT,
                heightlock BIGINT,
                PRIMARY KEY (tx_id, output_index)
            );
            CREATE TABLE IF NOT EXISTS address (
                address TEXT PRIMARY KEY,
                wallet_id TEXT,
                address_index INTEGER,
                transactions INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS address_balance (
                address TEXT NOT NULL,
                token_id TEXT NOT NULL,
                unlocked BIGINT NOT NULL DEFAULT 0,
                locked BIGINT NOT NULL DEFAULT 0,
                transactions INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (address, token_id)
            );
            CREATE TABLE IF NOT EXISTS address_tx_history (
                address TEXT NOT NULL,
                tx_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                balance BIGINT NOT NULL,
                timestamp BIGINT NOT NULL,
                PRIMARY KEY (address, tx_id, token_id)
            );
            CREATE TABLE IF NOT EXISTS wallet (
                id TEXT PRIMARY KEY,
                xpubkey TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                max_gap INTEGER NOT NULL,
                created_at BIGINT NOT NULL,
                ready_at BIGINT
            );
            CREATE TABLE IF NOT EXISTS wallet_balance (
                wallet_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                unlocked BIGINT NOT NULL DEFAULT 0,
                locked BIGINT NOT NULL DEFAULT 0,
                transactions INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (wallet_id, token_id)
            );
            CREATE TABLE IF NOT EXISTS wallet_tx_history (
                wallet_id TEXT NOT NULL,
                tx_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                balance BIGINT NOT NULL,
                timestamp BIGINT NOT NULL,
                PRIMARY KEY (wallet_id, tx_id, token_id, timestamp)
            );
            CREATE TABLE IF NOT EXISTS projected_tx (
                tx_id TEXT PRIMARY KEY,
                height BIGINT
            );
            ",
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

}

#[async_trait]
impl ProjectionLedger for PgStore {
    async fn is_already_projected(&self, tx_id: &str) -> StoreResult<bool> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let row = client
            .query_opt("SELECT 1 FROM projected_tx WHERE tx_id = $1", &[&tx_id])
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn mark_projected(&self, tx_id: &str, height: Option<u32>) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "INSERT INTO projected_tx (tx_id, height) VALUES ($1, $2)
                 ON CONFLICT (tx_id) DO NOTHING",
                &[&tx_id, &height.map(|h| h as i64)],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl AddressStore for PgStore {
    async fn insert_utxo(&self, key: UtxoKey, record: UtxoRecord) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "INSERT INTO utxo (tx_id, output_index, token_id, address, value, timelock, heightlock)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &key.tx_id,
                    &(key.index as i32),
                    &record.token_id.0,
                    &record.address,
                    &(record.value as i64),
                    &record.timelock.map(|t| t as i64),
                    &record.heightlock.map(|h| h as i64),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_utxo(&self, key: &UtxoKey) -> StoreResult<UtxoRecord> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let row = client
            .query_opt(
                "DELETE FROM utxo WHERE tx_id = $1 AND output_index = $2
                 RETURNING token_id, address, value, timelock, heightlock",
                &[&key.tx_id, &(key.index as i32)],
            )
            .await
            .map_err(storage_err)?
            .ok_or_else(|| {
                IndexerError::InconsistentChain(format!(
                    "input references unknown utxo {}:{}",
                    key.tx_id, key.index
                ))
            })?;
        Ok(UtxoRecord {
            token_id: TokenId(row.get("token_id")),
            address: row.get("address"),
            value: row.get::<_, i64>("value") as u64,
            timelock: row.get::<_, Option<i64>>("timelock").map(|v| v as u32),
            heightlock: row.get::<_, Option<i64>>("heightlock").map(|v| v as u32),
        })
    }

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &AddressDeltaMap,
    ) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        for (address, by_token) in deltas {
            client
                .execute(
                    "INSERT INTO address (address, transactions) VALUES ($1, 1)
                     ON CONFLICT (address) DO UPDATE SET transactions = address.transactions + 1",
                    &[address],
                )
                .await
                .map_err(storage_err)?;

            for (token, delta) in by_token {
                client
                    .execute(
                        "INSERT INTO address_balance (address, token_id, unlocked, locked, transactions)
                         VALUES ($1, $2, $3, $4, 1)
                         ON CONFLICT (address, token_id) DO UPDATE SET
                             unlocked = address_balance.unlocked + $5,
                             locked = address_balance.locked + $6,
                             transactions = address_balance.transactions + 1",
                        &[
                            address,
                            &token.0,
                            &delta.unlocked.max(0),
                            &delta.locked.max(0),
                            &delta.unlocked,
                            &delta.locked,
                        ],
                    )
                    .await
                    .map_err(storage_err)?;

                client
                    .execute(
                        "INSERT INTO address_tx_history (address, tx_id, token_id, balance, timestamp)
                         VALUES ($1, $2, $3, $4, $5)",
                        &[address, &tx_id, &token.0, &delta.signed_total(), &(timestamp as i64)],
                    )
                    .await
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }

    async fn apply_unlock(&self, deltas: &AddressDeltaMap) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        for (address, by_token) in deltas {
            for (token, delta) in by_token {
                client
                    .execute(
                        "UPDATE address_balance SET unlocked = unlocked + $3, locked = locked + $4
                         WHERE address = $1 AND token_id = $2",
                        &[address, &token.0, &delta.unlocked, &delta.locked],
                    )
                    .await
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }

    async fn find_utxos_maturing_at(
        &self,
        height: u32,
        now: u32,
    ) -> StoreResult<Vec<(UtxoKey, UtxoRecord)>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT tx_id, output_index, token_id, address, value, timelock, heightlock
                 FROM utxo WHERE heightlock = $1 AND (timelock IS NULL OR timelock <= $2)",
                &[&(height as i64), &(now as i64)],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let key = UtxoKey {
                    tx_id: row.get("tx_id"),
                    index: row.get::<_, i32>("output_index") as u32,
                };
                let record = UtxoRecord {
                    token_id: TokenId(row.get("token_id")),
                    address: row.get("address"),
                    value: row.get::<_, i64>("value") as u64,
                    timelock: row.get::<_, Option<i64>>("timelock").map(|v| v as u32),
                    heightlock: row.get::<_, Option<i64>>("heightlock").map(|v| v as u32),
                };
                (key, record)
            })
            .collect())
    }

    async fn lookup_wallets_by_addresses(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, WalletClaim>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT a.address, w.id AS wallet_id, w.xpubkey, w.max_gap
                 FROM address a JOIN wallet w ON w.id = a.wallet_id
                 WHERE a.address = ANY($1)",
                &[&addresses],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let address: String = row.get("address");
                let claim = WalletClaim {
                    wallet_id: row.get("wallet_id"),
                    xpubkey: row.get("xpubkey"),
                    max_gap: row.get::<_, i32>("max_gap") as u32,
                };
                (address, claim)
            })
            .collect())
    }

    async fn get_address(&self, address: &str) -> StoreResult<Option<AddressRow>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let row = client
            .query_opt(
                "SELECT address, wallet_id, address_index, transactions FROM address WHERE address = $1",
                &[&address],
            )
            .await
            .map_err(storage_err)?;
        Ok(row.map(row_to_address))
    }

    async fn get_addresses_batch(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<String, AddressRow>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT address, wallet_id, address_index, transactions FROM address WHERE address = ANY($1)",
                &[&addresses],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(row_to_address)
            .map(|row| (row.address.clone(), row))
            .collect())
    }

    async fn claim_address(&self, address: &str, wallet_id: &str, index: u32) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "UPDATE address SET wallet_id = $2, address_index = $3 WHERE address = $1",
                &[&address, &wallet_id, &(index as i32)],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn insert_claimed_address(
        &self,
        address: &str,
        wallet_id: &str,
        index: u32,
    ) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "INSERT INTO address (address, wallet_id, address_index, transactions)
                 VALUES ($1, $2, $3, 0)",
                &[&address, &wallet_id, &(index as i32)],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_wallet_addresses(&self, wallet_id: &str) -> StoreResult<Vec<WalletAddress>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT address, address_index, transactions FROM address
                 WHERE wallet_id = $1 ORDER BY address_index ASC",
                &[&wallet_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|row| WalletAddress {
                address: row.get("address"),
                index: row.get::<_, Option<i32>>("address_index").unwrap_or(0) as u32,
                transactions: row.get::<_, i32>("transactions") as u32,
            })
            .collect())
    }

    async fn aggregate_for_window(
        &self,
        addresses: &[String],
    ) -> StoreResult<HashMap<TokenId, AddressAggregate>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let mut out: HashMap<TokenId, AddressAggregate> = HashMap::new();

        let balance_rows = client
            .query(
                "SELECT token_id, SUM(unlocked) AS unlocked, SUM(locked) AS locked
                 FROM address_balance WHERE address = ANY($1) GROUP BY token_id",
                &[&addresses],
            )
            .await
            .map_err(storage_err)?;
        for row in balance_rows {
            let token = TokenId(row.get("token_id"));
            let entry = out.entry(token).or_default();
            entry.balance.unlocked = row.get::<_, i64>("unlocked");
            entry.balance.locked = row.get::<_, i64>("locked");
        }

        let history_rows = client
            .query(
                "SELECT token_id, SUM(balance) AS balance, COUNT(DISTINCT tx_id) AS tx_count
                 FROM address_tx_history WHERE address = ANY($1) GROUP BY token_id",
                &[&addresses],
            )
            .await
            .map_err(storage_err)?;
        for row in history_rows {
            let token = TokenId(row.get("token_id"));
            let entry = out.entry(token).or_default();
            entry.history_balance = row.get::<_, i64>("balance");
            entry.distinct_tx_count = row.get::<_, i64>("tx_count") as u32;
        }

        Ok(out)
    }

    async fn grouped_tx_history(
        &self,
        addresses: &[String],
    ) -> StoreResult<Vec<(TokenId, String, i64, u32)>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT tx_id, token_id, SUM(balance) AS balance, MAX(timestamp) AS timestamp
                 FROM address_tx_history WHERE address = ANY($1)
                 GROUP BY tx_id, token_id",
                &[&addresses],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    TokenId(row.get("token_id")),
                    row.get("tx_id"),
                    row.get::<_, i64>("balance"),
                    row.get::<_, i64>("timestamp") as u32,
                )
            })
            .collect())
    }
}

fn row_to_address(row: tokio_postgres::Row) -> AddressRow {
    AddressRow {
        address: row.get("address"),
        wallet_id: row.get("wallet_id"),
        index: row.get::<_, Option<i32>>("address_index").map(|v| v as u32),
        transactions: row.get::<_, i32>("transactions") as u32,
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn register(&self, xpubkey: &str, max_gap: u32, created_at: u32) -> StoreResult<String> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let existing = client
            .query_opt("SELECT id FROM wallet WHERE xpubkey = $1", &[&xpubkey])
            .await
            .map_err(storage_err)?;
        if existing.is_some() {
            return Err(IndexerError::WalletAlreadyCreated(xpubkey.to_string()));
        }
        let id = format!("wallet-{}", Uuid::new_v4());
        client
            .execute(
                "INSERT INTO wallet (id, xpubkey, status, max_gap, created_at, ready_at)
                 VALUES ($1, $2, 'creating', $3, $4, NULL)",
                &[&id, &xpubkey, &(max_gap as i32), &(created_at as i64)],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    async fn apply_deltas(
        &self,
        tx_id: &str,
        timestamp: u32,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        for (wallet_id, by_token) in deltas {
            for (token, delta) in by_token {
                client
                    .execute(
                        "INSERT INTO wallet_balance (wallet_id, token_id, unlocked, locked, transactions)
                         VALUES ($1, $2, $3, $4, 1)
                         ON CONFLICT (wallet_id, token_id) DO UPDATE SET
                             unlocked = wallet_balance.unlocked + $5,
                             locked = wallet_balance.locked + $6,
                             transactions = wallet_balance.transactions + 1",
                        &[
                            wallet_id,
                            &token.0,
                            &delta.unlocked.max(0),
                            &delta.locked.max(0),
                            &delta.unlocked,
                            &delta.locked,
                        ],
                    )
                    .await
                    .map_err(storage_err)?;

                client
                    .execute(
                        "INSERT INTO wallet_tx_history (wallet_id, tx_id, token_id, balance, timestamp)
                         VALUES ($1, $2, $3, $4, $5)",
                        &[wallet_id, &tx_id, &token.0, &delta.signed_total(), &(timestamp as i64)],
                    )
                    .await
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }

    async fn apply_unlock(
        &self,
        deltas: &HashMap<String, HashMap<TokenId, BalanceDelta>>,
    ) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        for (wallet_id, by_token) in deltas {
            for (token, delta) in by_token {
                client
                    .execute(
                        "UPDATE wallet_balance SET unlocked = unlocked + $3, locked = locked + $4
                         WHERE wallet_id = $1 AND token_id = $2",
                        &[wallet_id, &token.0, &delta.unlocked, &delta.locked],
                    )
                    .await
                    .map_err(storage_err)?;
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
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "INSERT INTO wallet_balance (wallet_id, token_id, unlocked, locked, transactions)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (wallet_id, token_id) DO UPDATE SET
                     unlocked = EXCLUDED.unlocked, locked = EXCLUDED.locked, transactions = EXCLUDED.transactions",
                &[
                    &wallet_id,
                    &token_id.0,
                    &balance.unlocked,
                    &balance.locked,
                    &(transactions as i32),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn seed_tx_history(
        &self,
        wallet_id: &str,
        rows: &[(TokenId, String, i64, u32)],
    ) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        for (token, tx_id, balance, timestamp) in rows {
            client
                .execute(
                    "INSERT INTO wallet_tx_history (wallet_id, tx_id, token_id, balance, timestamp)
                     VALUES ($1, $2, $3, $4, $5)
                     ON CONFLICT (wallet_id, tx_id, token_id, timestamp) DO NOTHING",
                    &[&wallet_id, tx_id, &token.0, balance, &(*timestamp as i64)],
                )
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn mark_ready(&self, wallet_id: &str, ready_at: u32) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute(
                "UPDATE wallet SET status = 'ready', ready_at = $2 WHERE id = $1",
                &[&wallet_id, &(ready_at as i64)],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_error(&self, wallet_id: &str) -> StoreResult<()> {
        let client = self.pool.get().await.map_err(storage_err)?;
        client
            .execute("UPDATE wallet SET status = 'error' WHERE id = $1", &[&wallet_id])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &str) -> StoreResult<Option<WalletRecord>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let row = client
            .query_opt(
                "SELECT id, xpubkey, status, max_gap, created_at, ready_at FROM wallet WHERE id = $1",
                &[&wallet_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(row.map(row_to_wallet))
    }

    async fn get_wallet_by_xpubkey(&self, xpubkey: &str) -> StoreResult<Option<WalletRecord>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let row = client
            .query_opt(
                "SELECT id, xpubkey, status, max_gap, created_at, ready_at FROM wallet WHERE xpubkey = $1",
                &[&xpubkey],
            )
            .await
            .map_err(storage_err)?;
        Ok(row.map(row_to_wallet))
    }

    async fn get_wallet_balances(
        &self,
        wallet_id: &str,
        token_id: Option<&TokenId>,
    ) -> StoreResult<Vec<BalanceRow>> {
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = match token_id {
            Some(token) => client
                .query(
                    "SELECT token_id, unlocked, locked, transactions FROM wallet_balance
                     WHERE wallet_id = $1 AND token_id = $2",
                    &[&wallet_id, &token.0],
                )
                .await
                .map_err(storage_err)?,
            None => client
                .query(
                    "SELECT token_id, unlocked, locked, transactions FROM wallet_balance WHERE wallet_id = $1",
                    &[&wallet_id],
                )
                .await
                .map_err(storage_err)?,
        };
        Ok(rows
            .into_iter()
            .map(|row| BalanceRow {
                token_id: TokenId(row.get("token_id")),
                balance: Balance {
                    unlocked: row.get("unlocked"),
                    locked: row.get("locked"),
                },
                transactions: row.get::<_, i32>("transactions") as u32,
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
        let client = self.pool.get().await.map_err(storage_err)?;
        let rows = client
            .query(
                "SELECT tx_id, timestamp, balance FROM wallet_tx_history
                 WHERE wallet_id = $1 AND token_id = $2
                 ORDER BY timestamp DESC
                 OFFSET $3 LIMIT $4",
                &[&wallet_id, &token_id.0, &(skip as i64), &(count as i64)],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|row| TxHistoryEntry {
                tx_id: row.get("tx_id"),
                timestamp: row.get::<_, i64>("timestamp") as u32,
                balance: row.get("balance"),
            })
            .collect())
    }
}

fn row_to_wallet(row: tokio_postgres::Row) -> WalletRecord {
    let status = match row.get::<_, String>("status").as_str() {
        "ready" => WalletStatus::Ready,
        "error" => WalletStatus::Error,
        _ => WalletStatus::Creating,
    };
    WalletRecord {
        id: row.get("id"),
        xpubkey: row.get("xpubkey"),
        status,
        max_gap: row.get::<_, i32>("max_gap") as u32,
        created_at: row.get::<_, i64>("created_at") as u32,
        ready_at: row.get::<_, Option<i64>>("ready_at").map(|v| v as u32),
    }
}

