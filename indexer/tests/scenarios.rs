//! End-to-end scenarios S1–S6 from spec §8, driven against [`MemStore`] so
//! they run without a live Postgres. Each asserts the literal balances the
//! spec walks through by hand; `BLOCK_REWARD_LOCK = 1` throughout, matching
//! the spec's worked example.

use std::sync::Arc;

use wallet_index_core::{AddressDeriver, DecodedOutput, HashDeriver, TokenId, TxEvent, TxInput, TxOutput};
use wallet_indexer::materializer::WalletMaterializer;
use wallet_indexer::projector::TxProjector;
use wallet_indexer::store::memory::MemStore;
use wallet_indexer::store::{AddressStore, WalletStore};

const BLOCK_VERSION: u8 = 0;
const REGULAR_VERSION: u8 = 1;
const NATIVE: &str = "00";

fn block_event(tx_id: &str, height: u32, timestamp: u32, address: &str, value: u64) -> TxEvent {
    TxEvent {
        version: BLOCK_VERSION,
        tx_id: tx_id.to_string(),
        timestamp,
        height: Some(height),
        inputs: vec![],
        outputs: vec![TxOutput {
            value,
            token: TokenId::from(NATIVE),
            decoded: DecodedOutput {
                address: address.to_string(),
                timelock: None,
            },
        }],
    }
}

fn spend_event(
    tx_id: &str,
    timestamp: u32,
    input_tx: &str,
    input_index: u32,
    input_value: u64,
    input_address: &str,
    outputs: &[(&str, u64)],
) -> TxEvent {
    TxEvent {
        version: REGULAR_VERSION,
        tx_id: tx_id.to_string(),
        timestamp,
        height: None,
        inputs: vec![TxInput {
            tx_id: input_tx.to_string(),
            index: input_index,
            value: input_value,
            token: TokenId::from(NATIVE),
            address: input_address.to_string(),
            timelock: None,
        }],
        outputs: outputs
            .iter()
            .map(|(address, value)| TxOutput {
                value: *value,
                token: TokenId::from(NATIVE),
                decoded: DecodedOutput {
                    address: address.to_string(),
                    timelock: None,
                },
            })
            .collect(),
    }
}

async fn balance_of(store: &MemStore, address: &str) -> (i64, i64, u32) {
    let row = store
        .get_addresses_batch(&[address.to_string()])
        .await
        .unwrap()
        .remove(address)
        .expect("address row must exist");
    let agg = store
        .aggregate_for_window(&[address.to_string()])
        .await
        .unwrap();
    let balance = agg.get(&TokenId::from(NATIVE)).copied().unwrap_or_default();
    (balance.balance.unlocked, balance.balance.locked, row.transactions)
}

#[tokio::test]
async fn s1_to_s4_block_reward_maturation_and_spend() {
    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);

    // S1: block at height 1 to address1.
    projector
        .project(&block_event("txId1", 1, 1_000, "address1", 6400))
        .await
        .unwrap();
    let (unlocked, locked, transactions) = balance_of(&store, "address1").await;
    assert_eq!((unlocked, locked, transactions), (0, 6400, 1));
    let utxo = store
        .find_utxos_maturing_at(2, 1_000)
        .await
        .unwrap();
    assert_eq!(utxo.len(), 1);

    // S2: block at height 2 to address1 — releases height-1's output.
    projector
        .project(&block_event("txId2", 2, 1_001, "address1", 6400))
        .await
        .unwrap();
    let (unlocked, locked, transactions) = balance_of(&store, "address1").await;
    assert_eq!((unlocked, locked, transactions), (6400, 6400, 2));

    // S3: block at height 3 to address2 — releases height-2's output.
    projector
        .project(&block_event("txId3", 3, 1_002, "address2", 6400))
        .await
        .unwrap();
    let a1 = balance_of(&store, "address1").await;
    assert_eq!(a1, (12800, 0, 2));
    let a2 = balance_of(&store, "address2").await;
    assert_eq!(a2, (0, 6400, 1));

    // S4: spend txId1's output to address3 (5) and address4 (6395).
    projector
        .project(&spend_event(
            "txId4",
            1_003,
            "txId1",
            0,
            6400,
            "address1",
            &[("address3", 5), ("address4", 6395)],
        ))
        .await
        .unwrap();
    let a1 = balance_of(&store, "address1").await;
    assert_eq!(a1, (6400, 0, 3));
    let a3 = balance_of(&store, "address3").await;
    assert_eq!(a3, (5, 0, 1));
    let a4 = balance_of(&store, "address4").await;
    assert_eq!(a4, (6395, 0, 1));

    // P2: history sums to balance for every touched address.
    for address in ["address1", "address2", "address3", "address4"] {
        let history = store.grouped_tx_history(&[address.to_string()]).await.unwrap();
        let sum: i64 = history.iter().map(|(_, _, balance, _)| balance).sum();
        let (unlocked, locked, _) = balance_of(&store, address).await;
        assert_eq!(sum, unlocked + locked, "I2 violated for {address}");
    }
}

#[tokio::test]
async fn s5_wallet_materialization_aggregates_claimed_addresses() {
    let deriver = Arc::new(HashDeriver);
    let xpub = "xpub-s5-test";

    // Derive the addresses this wallet will claim at indices 0 and 2, and
    // run S1–S4 against them exactly as in the previous scenario.
    let derived = deriver.derive(xpub, 0, 3);
    let address1 = derived[0].0.clone();
    let address3 = derived[2].0.clone();

    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);
    projector
        .project(&block_event("txId1", 1, 1_000, &address1, 6400))
        .await
        .unwrap();
    projector
        .project(&block_event("txId2", 2, 1_001, &address1, 6400))
        .await
        .unwrap();
    projector
        .project(&block_event("txId3", 3, 1_002, "address2", 6400))
        .await
        .unwrap();
    projector
        .project(&spend_event(
            "txId4",
            1_003,
            "txId1",
            0,
            6400,
            &address1,
            &[(address3.as_str(), 5), ("address4", 6395)],
        ))
        .await
        .unwrap();

    let materializer = WalletMaterializer::new(store.clone(), deriver.clone());
    let wallet_id = materializer.register(xpub, 20, 2_000).await.unwrap();
    materializer
        .materialize(&wallet_id, xpub, 20, 2_000)
        .await
        .unwrap();

    let wallet = store.get_wallet(&wallet_id).await.unwrap().unwrap();
    assert_eq!(wallet.status, wallet_indexer::store::WalletStatus::Ready);

    let addresses = store.get_wallet_addresses(&wallet_id).await.unwrap();
    assert_eq!(addresses.len(), 23, "window size must be highestUsed + maxGap + 1");

    let balances = store
        .get_wallet_balances(&wallet_id, Some(&TokenId::from(NATIVE)))
        .await
        .unwrap();
    let balance = &balances[0];
    assert_eq!(balance.balance.unlocked, 6405);
    assert_eq!(balance.balance.locked, 0);
    assert_eq!(balance.transactions, 3);
}

#[tokio::test]
async fn s6_tx_history_pagination_returns_older_entry() {
    let store = Arc::new(MemStore::new());
    store.register("xpub-s6", 20, 0).await.unwrap();
    let wallet_id = store.get_wallet_by_xpubkey("xpub-s6").await.unwrap().unwrap().id;

    let mut deltas = std::collections::HashMap::new();
    deltas.insert(
        wallet_id.clone(),
        std::collections::HashMap::from([(
            TokenId::from(NATIVE),
            wallet_index_core::BalanceDelta::unlocked(10),
        )]),
    );
    WalletStore::apply_deltas(&*store, "tx-old", 100, &deltas).await.unwrap();
    WalletStore::apply_deltas(&*store, "tx-new", 200, &deltas).await.unwrap();

    let page = store
        .get_wallet_tx_history(&wallet_id, &TokenId::from(NATIVE), 1, 1)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].tx_id, "tx-old");
}

#[tokio::test]
async fn p6_double_spend_is_rejected_with_no_state_change() {
    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);

    projector
        .project(&block_event("txId1", 1, 1_000, "address1", 6400))
        .await
        .unwrap();
    projector
        .project(&spend_event("txId2", 1_001, "txId1", 0, 6400, "address1", &[("address3", 6400)]))
        .await
        .unwrap();

    let before = balance_of(&store, "address1").await;

    // Same input spent again by a different tx: the UTXO is already gone.
    let err = projector
        .project(&spend_event("txId3", 1_002, "txId1", 0, 6400, "address1", &[("address4", 6400)]))
        .await
        .unwrap_err();
    assert!(matches!(err, wallet_indexer::error::IndexerError::InconsistentChain(_)));

    let after = balance_of(&store, "address1").await;
    assert_eq!(before, after, "a rejected spend must not change stored balances");
}

#[tokio::test]
async fn project_is_idempotent_for_a_repeated_tx_id() {
    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);

    let event = block_event("txId1", 1, 1_000, "address1", 6400);
    projector.project(&event).await.unwrap();
    projector.project(&event).await.unwrap();

    let (unlocked, locked, transactions) = balance_of(&store, "address1").await;
    assert_eq!((unlocked, locked, transactions), (0, 6400, 1), "re-submitting must be a no-op");
}

#[tokio::test]
async fn multi_token_transaction_keeps_balances_separate_per_token() {
    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);

    let event = TxEvent {
        version: REGULAR_VERSION,
        tx_id: "tx-multi".to_string(),
        timestamp: 1_000,
        height: None,
        inputs: vec![],
        outputs: vec![
            TxOutput {
                value: 100,
                token: TokenId::from(NATIVE),
                decoded: DecodedOutput {
                    address: "address1".to_string(),
                    timelock: None,
                },
            },
            TxOutput {
                value: 250,
                token: TokenId::from("custom-token"),
                decoded: DecodedOutput {
                    address: "address1".to_string(),
                    timelock: None,
                },
            },
        ],
    };
    projector.project(&event).await.unwrap();

    let agg = store.aggregate_for_window(&["address1".to_string()]).await.unwrap();
    let native = agg.get(&TokenId::from(NATIVE)).unwrap();
    let custom = agg.get(&TokenId::from("custom-token")).unwrap();
    assert_eq!(native.balance.unlocked, 100);
    assert_eq!(custom.balance.unlocked, 250);
}

#[tokio::test]
async fn future_timelock_output_is_locked_until_it_matures() {
    let store = Arc::new(MemStore::new());
    let projector = TxProjector::new(store.clone(), 1);

    let event = TxEvent {
        version: REGULAR_VERSION,
        tx_id: "tx-timelock".to_string(),
        timestamp: 1_000,
        height: None,
        inputs: vec![],
        outputs: vec![TxOutput {
            value: 42,
            token: TokenId::from(NATIVE),
            decoded: DecodedOutput {
                address: "address1".to_string(),
                timelock: Some(2_000),
            },
        }],
    };
    projector.project(&event).await.unwrap();

    let (unlocked, locked, _) = balance_of(&store, "address1").await;
    assert_eq!((unlocked, locked), (0, 42));
}
