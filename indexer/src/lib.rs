//! Transaction projection and wallet materialization service for a
//! UTXO-based wallet index, plus the Axum read API over its projections.
//!
//! `main.rs` wires these modules together against a live Postgres pool;
//! `tests/scenarios.rs` wires the same [`projector::TxProjector`] and
//! [`materializer::WalletMaterializer`] against [`store::memory::MemStore`]
//! so the projection algorithm can be exercised without a database.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod materializer;
pub mod metrics;
pub mod projector;
pub mod store;
