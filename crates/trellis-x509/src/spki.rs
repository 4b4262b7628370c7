//! Generic public-key encodings.
//!
//! Converts an OpenPGP master key into the X.509 SubjectPublicKeyInfo
//! structure carrying the same key material, so the bridge can compare it
//! byte-for-byte against the certificate's own key.

use sequoia_openpgp::crypto::mpi;
use sequoia_openpgp::packet::{key, Key};
use sequoia_openpgp::types::Curve;

use crate::der;
use crate::BridgeError;

/// id-Ed25519 (1.3.101.112).
const OID_ED25519: &[u8] = &[0x2B, 0x65, 0x70];
/// rsaEncryption (1.2.840.113549.1.1.1).
const OID_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// Encodes an Ed25519 public point as a SubjectPublicKeyInfo structure.
pub fn ed25519_spki(point: &[u8]) -> Vec<u8> {
    let algorithm = der::sequence(&[&der::tlv(der::TAG_OID, OID_ED25519)]);
    der::sequence(&[&algorithm, &der::bit_string(point)])
}

/// Encodes an RSA public key (modulus, exponent) as a SubjectPublicKeyInfo
/// structure wrapping a PKCS#1 RSAPublicKey.
pub fn rsa_spki(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let algorithm = der::sequence(&[
        &der::tlv(der::TAG_OID, OID_RSA),
        &der::tlv(der::TAG_NULL, &[]),
    ]);
    let rsa_public_key = der::sequence(&[
        &der::unsigned_integer(modulus),
        &der::unsigned_integer(exponent),
    ]);
    der::sequence(&[&algorithm, &der::bit_string(&rsa_public_key)])
}

/// Converts an OpenPGP key into its SubjectPublicKeyInfo encoding.
///
/// # Errors
///
/// Returns [`BridgeError::UnsupportedAlgorithm`] for key algorithms the
/// bridge does not translate.
pub fn to_spki<P, R>(key: &Key<P, R>) -> Result<Vec<u8>, BridgeError>
where
    P: key::KeyParts,
    R: key::KeyRole,
{
    match key.mpis() {
        mpi::PublicKey::EdDSA {
            curve: Curve::Ed25519,
            q,
        } => {
            // The MPI carries the point in native format, 0x40 || x.
            let point = q.value();
            let raw = point.strip_prefix(&[0x40]).unwrap_or(point);
            if raw.len() != 32 {
                return Err(BridgeError::UnsupportedAlgorithm(
                    "malformed Ed25519 point".into(),
                ));
            }
            Ok(ed25519_spki(raw))
        }
        mpi::PublicKey::RSA { e, n } => Ok(rsa_spki(n.value(), e.value())),
        _ => Err(BridgeError::UnsupportedAlgorithm(
            key.pk_algo().to_string(),
        )),
    }
}
