//! Pure domain types and algorithms for the UTXO wallet indexer.
//!
//! Nothing in this crate touches a database, a socket, or the clock — it is
//! the part of `wallet-indexer` that can be unit tested without standing up
//! any infrastructure. `wallet-indexer` links this crate and supplies the
//! I/O: Postgres storage, the event transport, and the real BIP-32 deriver.

pub mod deriver;
pub mod gap;
pub mod lock;
pub mod model;

pub use deriver::{AddressDeriver, HashDeriver};
pub use gap::GapScanner;
pub use lock::{LockBucket, LockManager};
pub use model::{
    accumulate, AddressDeltaMap, Balance, BalanceDelta, DecodedOutput, TokenId, TxEvent, TxInput,
    TxOutput, UtxoKey, UtxoRecord, BLOCK_VERSION, NATIVE_TOKEN,
};
