//! Trust and authentication orchestration for the Trellis federation node.
//!
//! This crate ties the lower layers together into the decisions the server
//! actually makes about a connecting client:
//!
//! - [`DomainTrust::authenticate`]: import the presented keyring and check
//!   whether the domain's trust anchor vouches for an identity on it
//! - [`DomainTrust::post_authenticate`]: decide whether a changed key may
//!   replace the key previously on record for the same address
//! - [`DomainTrust::sign_key`] and [`DomainTrust::sign_data`]: certify and
//!   sign through the signing agent, which alone holds anchor secrets
//! - [`DomainTrust::revoked`]: accept a revocation proof for a key
//!
//! A [`TrustRegistry`] hands out one [`DomainTrust`] per serving domain,
//! built lazily from the [`TrustConfig`].

use thiserror::Error;

mod config;
mod orchestrator;
mod registry;

pub use config::{AgentConfig, ConfigError, DomainConfig, TrustConfig};
pub use orchestrator::{DomainTrust, Identity};
pub use registry::TrustRegistry;

/// Errors surfaced by the trust layer.
///
/// Policy rejections are not errors; rejecting a key yields `Ok(None)` or
/// `Ok(false)` from the operation concerned. These variants cover genuine
/// failures only.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The keyring store failed.
    #[error(transparent)]
    Store(#[from] trellis_store::StoreError),

    /// The signing agent failed.
    #[error(transparent)]
    Agent(#[from] trellis_agent::AgentError),

    /// A trust anchor key could not be parsed.
    #[error("invalid trust anchor: {0}")]
    Anchor(#[from] trellis_pgp::PgpError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested domain is not configured.
    #[error("unknown serving domain: {0}")]
    UnknownDomain(String),

    /// An anchor key file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
