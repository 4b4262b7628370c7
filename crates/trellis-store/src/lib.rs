//! Persistent keyring storage for the Trellis federation node.
//!
//! Each domain keeps a local database of the public key rings it has seen,
//! keyed by master-key fingerprint. Storage is SQLite in WAL mode behind an
//! `r2d2` pool, with the schema managed by embedded migrations, matching
//! the rest of the platform's persistence layer.
//!
//! The one operation with interesting semantics is [`KeyRingStore::import`]:
//! a ring imported over an existing ring with the same fingerprint is
//! merged into it, signature by signature, so the store only ever grows
//! what it knows about a key.

use thiserror::Error;

mod migrations;
mod pool;
mod store;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, PoolError, StoreSettings};
pub use store::KeyRingStore;

/// Errors produced by the keyring store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The input (or a stored blob) is not a usable key ring.
    #[error(transparent)]
    Malformed(#[from] trellis_pgp::PgpError),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A pooled connection could not be obtained.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The pool itself could not be created.
    #[error(transparent)]
    PoolInit(#[from] PoolError),

    /// The schema could not be brought up to date.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A ring could not be re-encoded for storage.
    #[error("failed to encode keyring: {0}")]
    Encode(String),

    /// The store has been closed.
    #[error("keyring store is closed")]
    Closed,
}
