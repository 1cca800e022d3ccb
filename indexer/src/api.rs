//! Read API surface (spec §6), following the teacher's `main.rs` idiom:
//! an axum `Router`, handlers returning `Json<serde_json::Value>` built via
//! `json!()`, and an `ApiState` bundling the `Arc`-wrapped collaborators.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;

use wallet_index_core::{AddressDeriver, TokenId, NATIVE_TOKEN};

use crate::config::Config;
use crate::error::IndexerError;
use crate::materializer::WalletMaterializer;
use crate::store::{AddressStore, ProjectionLedger, WalletStatus, WalletStore};

pub struct ApiState<S, D> {
    pub store: Arc<S>,
    pub materializer: Arc<WalletMaterializer<S, D>>,
    pub config: Arc<Config>,
    pub metrics: PrometheusHandle,
}

pub fn router<S, D>(state: Arc<ApiState<S, D>>) -> Router
where
    S: AddressStore + WalletStore + ProjectionLedger + 'static,
    D: AddressDeriver + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::<S, D>))
        .route("/wallets", post(create_wallet::<S, D>))
        .route("/wallets/:id", get(get_wallet::<S, D>))
        .route("/wallets/:id/addresses", get(get_addresses::<S, D>))
        .route("/wallets/:id/balances", get(get_balances::<S, D>))
        .route("/wallets/:id/tx-history", get(get_tx_history::<S, D>))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"success": true}))
}

async fn metrics<S, D>(State(state): State<Arc<ApiState<S, D>>>) -> impl IntoResponse {
    let body = state.metrics.render();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn require_ready<S: WalletStore>(store: &S, wallet_id: &str) -> Result<crate::store::WalletRecord, IndexerError> {
    let wallet = store
        .get_wallet(wallet_id)
        .await?
        .ok_or_else(|| IndexerError::WalletNotFound(wallet_id.to_string()))?;
    if wallet.status != WalletStatus::Ready {
        return Err(IndexerError::WalletNotReady(wallet_id.to_string()));
    }
    Ok(wallet)
}

async fn get_addresses<S, D>(
    State(state): State<Arc<ApiState<S, D>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, IndexerError>
where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    require_ready(&*state.store, &id).await?;
    let addresses = state.store.get_wallet_addresses(&id).await?;
    Ok(Json(json!({
        "success": true,
        "addresses": addresses.into_iter().map(|a| json!({
            "address": a.address,
            "index": a.index,
            "transactions": a.transactions,
        })).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
struct BalancesQuery {
    token_id: Option<String>,
}

async fn get_balances<S, D>(
    State(state): State<Arc<ApiState<S, D>>>,
    Path(id): Path<String>,
    Query(query): Query<BalancesQuery>,
) -> Result<Json<serde_json::Value>, IndexerError>
where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    require_ready(&*state.store, &id).await?;
    let token = query.token_id.map(TokenId);
    let balances = state.store.get_wallet_balances(&id, token.as_ref()).await?;
    Ok(Json(json!({
        "success": true,
        "balances": balances.into_iter().map(|b| json!({
            "tokenId": b.token_id.0,
            "transactions": b.transactions,
            "balance": {"unlocked": b.balance.unlocked, "locked": b.balance.locked},
        })).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
struct TxHistoryQuery {
    token_id: Option<String>,
    skip: Option<String>,
    count: Option<String>,
}

async fn get_tx_history<S, D>(
    State(state): State<Arc<ApiState<S, D>>>,
    Path(id): Path<String>,
    Query(query): Query<TxHistoryQuery>,
) -> Result<Json<serde_json::Value>, IndexerError>
where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    require_ready(&*state.store, &id).await?;

    let token = TokenId(query.token_id.unwrap_or_else(|| NATIVE_TOKEN.to_string()));
    let skip = parse_param("skip", query.skip, 0)?;
    let count = parse_param("count", query.count, state.config.default_history_page_size)?
        .min(state.config.history_page_size_max);

    let history = state
        .store
        .get_wallet_tx_history(&id, &token, skip, count)
        .await?;
    Ok(Json(json!({
        "success": true,
        "history": history.into_iter().map(|h| json!({
            "txId": h.tx_id,
            "timestamp": h.timestamp,
            "balance": h.balance,
        })).collect::<Vec<_>>(),
        "skip": skip,
        "count": count,
    })))
}

fn parse_param(name: &str, raw: Option<String>, default: u32) -> Result<u32, IndexerError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<u32>().map_err(|_| IndexerError::InvalidParameter {
            name: name.to_string(),
            reason: "must be a non-negative integer".to_string(),
        }),
    }
}

async fn get_wallet<S, D>(
    State(state): State<Arc<ApiState<S, D>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, IndexerError>
where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    let wallet = state
        .store
        .get_wallet(&id)
        .await?
        .ok_or_else(|| IndexerError::WalletNotFound(id.clone()))?;
    let status = match wallet.status {
        WalletStatus::Creating => "creating",
        WalletStatus::Ready => "ready",
        WalletStatus::Error => "error",
    };
    Ok(Json(json!({
        "success": true,
        "status": {
            "walletId": wallet.id,
            "xpubkey": wallet.xpubkey,
            "status": status,
            "maxGap": wallet.max_gap,
            "createdAt": wallet.created_at,
            "readyAt": wallet.ready_at,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct CreateWalletBody {
    xpubkey: Option<String>,
}

async fn create_wallet<S, D>(
    State(state): State<Arc<ApiState<S, D>>>,
    body: Result<Json<CreateWalletBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<serde_json::Value>, IndexerError>
where
    S: AddressStore + WalletStore + ProjectionLedger + 'static,
    D: AddressDeriver + 'static,
{
    let Json(body) = body.map_err(|e| IndexerError::InvalidBody(e.to_string()))?;
    let xpubkey = body
        .xpubkey
        .filter(|x| !x.is_empty())
        .ok_or_else(|| IndexerError::MissingParameter("xpubkey".to_string()))?;

    let now = chrono::Utc::now().timestamp() as u32;
    let wallet_id = state
        .materializer
        .register(&xpubkey, state.config.default_gap_limit, now)
        .await?;

    let materializer = state.materializer.clone();
    let wallet_id_task = wallet_id.clone();
    let xpubkey_task = xpubkey.clone();
    let max_gap = state.config.default_gap_limit;
    tokio::spawn(async move {
        if let Err(err) = materializer
            .materialize(&wallet_id_task, &xpubkey_task, max_gap, now)
            .await
        {
            tracing::error!(wallet_id = %wallet_id_task, %err, "materialization failed");
        }
    });

    Ok(Json(json!({
        "success": true,
        "walletId": wallet_id,
        "status": "creating",
    })))
}

