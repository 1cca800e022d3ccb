//! `TxProjector`: the write entry point (spec §4.1).
//!
//! Generic over a single store type that implements all three storage
//! traits — both `PgStore` and `MemStore` do — so the same projector code
//! runs against Postgres in production and against the in-memory backend in
//! `tests/scenarios.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use wallet_index_core::{
    accumulate, AddressDeltaMap, BalanceDelta, LockManager, TokenId, TxEvent, UtxoKey, UtxoRecord,
};

use crate::store::{AddressStore, ProjectionLedger, StoreResult, WalletStore};

pub struct TxProjector<S> {
    store: Arc<S>,
    block_reward_lock: u32,
}

impl<S> TxProjector<S>
where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    pub fn new(store: Arc<S>, block_reward_lock: u32) -> Self {
        Self {
            store,
            block_reward_lock,
        }
    }

    /// Idempotent: re-submitting an already-projected tx_id is a no-op.
    pub async fn project(&self, event: &TxEvent) -> StoreResult<()> {
        if self.store.is_already_projected(&event.tx_id).await? {
            return Ok(());
        }

        let is_block = event.is_block();
        let deltas = self.compute_address_deltas(event, is_block);

        for input in &event.inputs {
            self.store
                .delete_utxo(&UtxoKey {
                    tx_id: input.tx_id.clone(),
                    index: input.index,
                })
                .await?;
        }

        let heightlock = LockManager::heightlock_for(event.height, is_block, self.block_reward_lock);
        for (index, output) in event.outputs.iter().enumerate() {
            self.store
                .insert_utxo(
                    UtxoKey {
                        tx_id: event.tx_id.clone(),
                        index: index as u32,
                    },
                    UtxoRecord {
                        token_id: output.token.clone(),
                        address: output.decoded.address.clone(),
                        value: output.value,
                        timelock: output.decoded.timelock,
                        heightlock,
                    },
                )
                .await?;
        }

        self.store
            .apply_deltas(&event.tx_id, event.timestamp, &deltas)
            .await?;

        let wallet_deltas = self.wallet_deltas_for(&deltas).await?;
        if !wallet_deltas.is_empty() {
            WalletStore::apply_deltas(&*self.store, &event.tx_id, event.timestamp, &wallet_deltas)
                .await?;
        }

        if is_block {
            if let Some(height) = event.height {
                self.release_matured(height, event.timestamp).await?;
            }
        }

        self.store.mark_projected(&event.tx_id, event.height).await?;
        Ok(())
    }

    /// Step 1 of §4.1: every input debits its address/token; every output
    /// credits whichever bucket `LockManager::classify` assigns it to.
    fn compute_address_deltas(&self, event: &TxEvent, is_block: bool) -> AddressDeltaMap {
        let mut map = AddressDeltaMap::new();
        for input in &event.inputs {
            accumulate(
                &mut map,
                &input.address,
                &input.token,
                BalanceDelta::unlocked(-(input.value as i64)),
            );
        }
        for output in &event.outputs {
            let bucket =
                LockManager::classify(output.decoded.timelock, event.timestamp, is_block);
            let value = output.value as i64;
            let delta = match bucket {
                wallet_index_core::LockBucket::Unlocked => BalanceDelta::unlocked(value),
                wallet_index_core::LockBucket::Locked => BalanceDelta::locked(value),
            };
            accumulate(&mut map, &output.decoded.address, &output.token, delta);
        }
        map
    }

    /// Step 5 of §4.1: fold address deltas into wallet deltas for addresses
    /// already claimed by a wallet.
    async fn wallet_deltas_for(
        &self,
        deltas: &AddressDeltaMap,
    ) -> StoreResult<HashMap<String, HashMap<TokenId, BalanceDelta>>> {
        let addresses: Vec<String> = deltas.keys().cloned().collect();
        let claims = self.store.lookup_wallets_by_addresses(&addresses).await?;

        let mut wallet_map: HashMap<String, HashMap<TokenId, BalanceDelta>> = HashMap::new();
        for (address, by_token) in deltas {
            let Some(claim) = claims.get(address) else {
                continue;
            };
            for (token, delta) in by_token {
                wallet_map
                    .entry(claim.wallet_id.clone())
                    .or_default()
                    .entry(token.clone())
                    .or_insert_with(BalanceDelta::default)
                    .add(*delta);
            }
        }
        Ok(wallet_map)
    }

    /// Step 6 of §4.1: release UTXOs whose heightlock matured at this block.
    async fn release_matured(&self, height: u32, now: u32) -> StoreResult<()> {
        let maturing = self.store.find_utxos_maturing_at(height, now).await?;
        if maturing.is_empty() {
            return Ok(());
        }

        let mut address_release = AddressDeltaMap::new();
        for (_, record) in &maturing {
            accumulate(
                &mut address_release,
                &record.address,
                &record.token_id,
                LockManager::release_delta(record.value),
            );
        }
        self.store.apply_unlock(&address_release).await?;

        let addresses: Vec<String> = address_release.keys().cloned().collect();
        let claims = self.store.lookup_wallets_by_addresses(&addresses).await?;
        let mut wallet_release: HashMap<String, HashMap<TokenId, BalanceDelta>> = HashMap::new();
        for (address, by_token) in &address_release {
            let Some(claim) = claims.get(address) else {
                continue;
            };
            for (token, delta) in by_token {
                wallet_release
                    .entry(claim.wallet_id.clone())
                    .or_default()
                    .entry(token.clone())
                    .or_insert_with(BalanceDelta::default)
                    .add(*delta);
            }
        }
        if !wallet_release.is_empty() {
            WalletStore::apply_unlock(&*self.store, &wallet_release).await?;
        }
        Ok(())
    }
}
