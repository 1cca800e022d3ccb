//! Event ingestion (spec §5): a single task consumes ordered events and
//! feeds them to the projector one at a time, so two `project` calls for
//! the same store are never interleaved — the "mutex around the projector,
//! or a single-consumer queue" requirement from §5, satisfied by construction
//! (there is exactly one consumer and it awaits each `project` before
//! pulling the next event).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};

use wallet_index_core::TxEvent;

use crate::projector::TxProjector;
use crate::store::{AddressStore, ProjectionLedger, WalletStore};

/// The externally supplied transport. `wallet-indexer` only needs ordered
/// delivery; how events actually arrive (websocket, gRPC stream, message
/// queue) is out of scope.
#[async_trait]
pub trait TxEventSource: Send {
    async fn recv(&mut self) -> Option<TxEvent>;
}

/// A bounded channel adapter: whatever decodes the wire format pushes
/// `TxEvent`s in here, and this struct is hooked up to [`run_consumer`] as
/// the single reader.
pub struct ChannelEventSource {
    receiver: mpsc::Receiver<TxEvent>,
}

impl ChannelEventSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<TxEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { receiver: rx })
    }
}

#[async_trait]
impl TxEventSource for ChannelEventSource {
    async fn recv(&mut self) -> Option<TxEvent> {
        self.receiver.recv().await
    }
}

/// Drains `source` and projects each event in arrival order. Storage errors
/// abort the current event and are logged; per §5 the transport owns retry
/// policy, so this loop simply moves on to the next event rather than
/// crashing the task.
pub async fn run_consumer<S>(
    mut source: impl TxEventSource,
    projector: Arc<TxProjector<S>>,
) where
    S: AddressStore + WalletStore + ProjectionLedger,
{
    while let Some(event) = source.recv().await {
        let tx_id = event.tx_id.clone();
        match projector.project(&event).await {
            Ok(()) => {
                crate::metrics::inc_events_projected();
                info!(tx_id, "projected");
            }
            Err(err) => {
                crate::metrics::inc_events_failed();
                error!(tx_id, %err, "projection failed");
            }
        }
    }
    info!("event source closed, consumer exiting");
}
