//! Stable error kinds for the read API and the projection pipeline (spec §7).
//!
//! The teacher's own source declares `thiserror` as a dependency but never
//! actually derives with it; this is the idiomatic use the pack elsewhere
//! shows for a storage/service error enum (mirrored from the `WalletDbError`
//! pattern in the reference pack).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid body: {0}")]
    InvalidBody(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("wallet not ready: {0}")]
    WalletNotReady(String),

    #[error("wallet already created: {0}")]
    WalletAlreadyCreated(String),

    #[error("inconsistent chain state: {0}")]
    InconsistentChain(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IndexerError {
    fn kind(&self) -> &'static str {
        match self {
            IndexerError::MissingParameter(_) => "MissingParameter",
            IndexerError::InvalidParameter { .. } => "InvalidParameter",
            IndexerError::InvalidBody(_) => "InvalidBody",
            IndexerError::WalletNotFound(_) => "WalletNotFound",
            IndexerError::WalletNotReady(_) => "WalletNotReady",
            IndexerError::WalletAlreadyCreated(_) => "WalletAlreadyCreated",
            IndexerError::InconsistentChain(_) => "InconsistentChain",
            IndexerError::StorageUnavailable(_) => "StorageUnavailable",
            IndexerError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            IndexerError::MissingParameter(_)
            | IndexerError::InvalidParameter { .. }
            | IndexerError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            IndexerError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            IndexerError::WalletNotReady(_) => StatusCode::CONFLICT,
            IndexerError::WalletAlreadyCreated(_) => StatusCode::CONFLICT,
            IndexerError::InconsistentChain(_) => StatusCode::CONFLICT,
            IndexerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            IndexerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Envelope shape from spec §6/§7: `{success, error, parameter?}`.
impl IntoResponse for IndexerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let parameter = match &self {
            IndexerError::MissingParameter(name) => Some(json!(name)),
            IndexerError::InvalidParameter { name, .. } => Some(json!(name)),
            _ => None,
        };
        let mut body = json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let (Some(obj), Some(parameter)) = (body.as_object_mut(), parameter) {
            obj.insert("parameter".to_string(), parameter);
        }
        (status, Json(body)).into_response()
    }
}
