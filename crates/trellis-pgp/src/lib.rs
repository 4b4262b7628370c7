//! OpenPGP key validation for the Trellis federation node.
//!
//! User identity on the network is anchored in OpenPGP key pairs, and
//! cross-network trust is bootstrapped by a single per-domain trust-anchor
//! key operated by the server. This crate holds the pure reasoning over
//! untrusted key material:
//!
//! - parsing and master-key access ([`ring`])
//! - expiry and revocation checks ([`ring`])
//! - domain-bound identity validation against the trust anchor ([`validate`])
//! - the conservative signature-union merge ([`merge`])
//! - user-ID parsing into `Name (Comment) <email>` parts ([`uid`])
//!
//! Nothing here performs I/O; the keyring store and the signing agent live
//! in their own crates and compose these functions.

use thiserror::Error;

pub mod merge;
pub mod ring;
pub mod uid;
pub mod validate;

pub use merge::merge;
pub use ring::{fingerprint, is_expired, is_expired_at, is_revoked, master_key, read_keyring};
pub use uid::UserId;
pub use validate::{validate, validate_at, CertificationKind, TrustAnchor};

/// Errors produced by keyring parsing, validation and merging.
#[derive(Debug, Error)]
pub enum PgpError {
    /// The input could not be parsed as an OpenPGP public key ring.
    #[error("invalid keyring data: {0}")]
    InvalidKeyring(String),

    /// Two rings presented for merging do not share the same master key.
    #[error("keys not equal: {old} / {new}")]
    KeyMismatch {
        /// Fingerprint of the ring already held.
        old: sequoia_openpgp::Fingerprint,
        /// Fingerprint of the candidate ring.
        new: sequoia_openpgp::Fingerprint,
    },

    /// A merged packet sequence could not be reassembled into a ring.
    #[error("merge produced an invalid keyring: {0}")]
    InvalidMerge(String),
}
