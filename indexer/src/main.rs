//! Service entry point: wires Postgres storage, the transaction projector,
//! the wallet materializer, the event-ingestion loop, and the read API into
//! one process, in the teacher's `main.rs` style (`tracing_subscriber::fmt`
//! init, `Config::load`, `axum::serve` with graceful shutdown).

use std::io::IsTerminal;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use wallet_index_core::HashDeriver;
use wallet_indexer::api::{self, ApiState};
use wallet_indexer::config::Config;
use wallet_indexer::events::{run_consumer, ChannelEventSource};
use wallet_indexer::materializer::WalletMaterializer;
use wallet_indexer::projector::TxProjector;
use wallet_indexer::store::postgres::PgStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config::load());
    tracing::info!(listen_addr = %config.listen_addr, "starting wallet-indexer");

    let metrics_handle = wallet_indexer::metrics::install();

    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = Some(config.database_url.clone());
    let pool = pg_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
        .expect("failed to build Postgres connection pool");

    let store = Arc::new(PgStore::new(pool));
    store.init_schema().await.expect("failed to initialize schema");

    let projector = Arc::new(TxProjector::new(store.clone(), config.block_reward_lock));
    let deriver = Arc::new(HashDeriver);
    let materializer = Arc::new(WalletMaterializer::new(store.clone(), deriver.clone()));

    let (event_tx, event_source) = ChannelEventSource::new(1024);
    tokio::spawn(run_consumer(event_source, projector.clone()));

    // Stdin is the reference transport: one NDJSON-encoded TxEvent per line.
    // A real deployment swaps this task for whatever delivers ordered events
    // (websocket, gRPC stream, message queue) without touching the projector.
    if !std::io::stdin().is_terminal() {
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(%err, "dropping malformed event"),
                }
            }
            tracing::info!("stdin event source closed");
        });
    }

    let state = Arc::new(ApiState {
        store,
        materializer,
        config: config.clone(),
        metrics: metrics_handle,
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listen address");

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("failed to register Ctrl+C handler");
            tracing::info!("Ctrl+C received, shutting down");
        }
    };

    tracing::info!(addr = %config.listen_addr, "read API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .expect("server error");
}
