//! Keyring primitives: parsing, master-key access, expiry and revocation.

use std::time::{Duration, SystemTime};

use sequoia_openpgp::packet::key::{PrimaryRole, PublicParts};
use sequoia_openpgp::packet::Key;
use sequoia_openpgp::parse::Parse;
use sequoia_openpgp::types::SignatureType;
use sequoia_openpgp::Cert;

use crate::PgpError;

/// Parses a binary OpenPGP public key block into a keyring.
///
/// # Errors
///
/// Returns [`PgpError::InvalidKeyring`] if the input is not a well-formed
/// public key ring (this also covers input with no master key, since such a
/// packet sequence cannot be assembled into a ring at all).
pub fn read_keyring(data: &[u8]) -> Result<Cert, PgpError> {
    Cert::from_bytes(data).map_err(|e| PgpError::InvalidKeyring(e.to_string()))
}

/// Returns the ring's master key.
pub fn master_key(cert: &Cert) -> &Key<PublicParts, PrimaryRole> {
    cert.primary_key().key()
}

/// Uppercase hexadecimal fingerprint of the ring's master key.
pub fn fingerprint(cert: &Cert) -> String {
    cert.fingerprint().to_hex()
}

/// Declared validity period of the master key, taken from the most recent
/// self-signature that carries one. Checks the direct-key signatures first,
/// then the user-ID bindings.
fn declared_validity(cert: &Cert) -> Option<Duration> {
    cert.primary_key()
        .bundle()
        .self_signatures()
        .iter()
        .find_map(|sig| sig.key_validity_period())
        .or_else(|| {
            cert.userids()
                .flat_map(|ua| ua.bundle().self_signatures())
                .find_map(|sig| sig.key_validity_period())
        })
}

/// Whether the master key is expired at `now`.
///
/// A creation time in the future counts as expired. A missing or zero
/// validity period means the key never expires.
pub fn is_expired_at(cert: &Cert, now: SystemTime) -> bool {
    let creation = master_key(cert).creation_time();
    if creation > now {
        return true;
    }
    match declared_validity(cert) {
        Some(validity) if !validity.is_zero() => creation + validity < now,
        _ => false,
    }
}

/// Whether the master key is expired right now.
pub fn is_expired(cert: &Cert) -> bool {
    is_expired_at(cert, SystemTime::now())
}

/// Whether the master key carries a verifying self-issued revocation.
///
/// Revocations issued under another key, and revocation packets whose
/// signature does not verify against this key, do not count.
pub fn is_revoked(cert: &Cert) -> bool {
    let primary = cert.primary_key();
    let pk = primary.key();
    primary
        .bundle()
        .self_revocations()
        .iter()
        .chain(primary.bundle().other_revocations())
        .filter(|sig| sig.typ() == SignatureType::KeyRevocation)
        .any(|sig| sig.clone().verify_primary_key_revocation(pk, pk).is_ok())
}
