//! Smoke test against a real Postgres, in the teacher's
//! `#[ignore] async fn test_payout_scheduler` style: skipped by default,
//! run explicitly (`cargo test --test postgres -- --ignored`) against
//! `TEST_DATABASE_URL`.

use std::sync::Arc;

use wallet_index_core::{DecodedOutput, TokenId, TxEvent, TxOutput};
use wallet_indexer::projector::TxProjector;
use wallet_indexer::store::postgres::PgStore;
use wallet_indexer::store::AddressStore;

#[tokio::test]
#[ignore] // Requires PostgreSQL; set TEST_DATABASE_URL to run.
async fn project_block_against_real_postgres() {
    let database_url =
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for this test");

    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = Some(database_url);
    let pool = pg_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
        .unwrap();

    let store = Arc::new(PgStore::new(pool));
    store.init_schema().await.unwrap();

    let projector = TxProjector::new(store.clone(), 1);
    let event = TxEvent {
        version: 0,
        tx_id: "pg-test-tx-1".to_string(),
        timestamp: 1_000,
        height: Some(1),
        inputs: vec![],
        outputs: vec![TxOutput {
            value: 6400,
            token: TokenId::from("00"),
            decoded: DecodedOutput {
                address: "pg-test-address".to_string(),
                timelock: None,
            },
        }],
    };
    projector.project(&event).await.unwrap();

    let row = store
        .get_addresses_batch(&["pg-test-address".to_string()])
        .await
        .unwrap();
    assert_eq!(row["pg-test-address"].transactions, 1);
}
