//! Signing agents.
//!
//! Certification of a user's key by the domain's trust anchor requires
//! access to the anchor's secret key. That access is isolated behind the
//! [`SigningAgent`] trait: the orchestrator asks an agent to certify,
//! sign, or export, and never touches secret key material itself.
//!
//! Two implementations are provided. [`GpgAgent`] shells out to an
//! external GnuPG binary whose keyring holds the anchor secret, matching
//! deployments where the secret lives outside the server process.
//! [`LocalAgent`] keeps keys in process memory; it backs tests and
//! single-node setups where an external agent is not warranted.

use sequoia_openpgp::KeyHandle;
use thiserror::Error;

mod local;
mod subprocess;

pub use local::LocalAgent;
pub use subprocess::GpgAgent;

/// Errors produced by signing agents.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent subprocess could not be spawned or spoken to.
    #[error("agent i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The agent subprocess ran but reported failure.
    #[error("agent operation '{op}' failed: {status}")]
    Subprocess {
        /// Which operation was being performed.
        op: &'static str,
        /// Exit status and captured diagnostics.
        status: String,
    },

    /// Key material handed to the agent could not be parsed.
    #[error(transparent)]
    InvalidKey(#[from] trellis_pgp::PgpError),

    /// The agent holds no key matching the given handle.
    #[error("no key matching {0}")]
    UnknownKey(String),

    /// A signing operation failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// A key could not be re-encoded for export.
    #[error("failed to encode key: {0}")]
    Encode(String),
}

/// Uppercase hex form of a key handle, as key servers and GnuPG expect it.
pub fn hex_id(handle: &KeyHandle) -> String {
    format!("{handle:X}")
}

/// Operations the trust layer needs from whatever holds secret keys.
///
/// Methods take `&mut self` because agents may keep per-operation state
/// (the GnuPG agent stages keys in its keyring); callers serialize access.
pub trait SigningAgent: Send {
    /// Imports a binary public key ring into the agent's keyring.
    fn import_key(&mut self, data: &[u8]) -> Result<(), AgentError>;

    /// Certifies every user ID of the given ring with the key identified
    /// by `signer`, returning the certified ring in binary form.
    ///
    /// The ring is staged, certified and removed again; the agent's
    /// keyring is not a second key store.
    fn sign_key(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError>;

    /// Signs arbitrary data with the key identified by `signer`, returning
    /// a binary OpenPGP message containing data and signature.
    fn sign_data(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError>;

    /// Removes the identified public key from the agent's keyring.
    fn delete_key(&mut self, handle: &KeyHandle) -> Result<(), AgentError>;

    /// Exports the identified public key ring in binary form.
    fn export_key(&mut self, handle: &KeyHandle) -> Result<Vec<u8>, AgentError>;
}
