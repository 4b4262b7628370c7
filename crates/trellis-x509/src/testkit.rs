//! Certificate construction kit for tests.
//!
//! Assembles minimal X.509 v3 certificate shells around an arbitrary
//! SubjectPublicKeyInfo and an optional embedded key block. The shells are
//! structurally valid DER but carry an all-zero signature; the bridge never
//! verifies certificate signatures (the TLS layer does), so that is enough
//! to exercise it.

use sequoia_openpgp::Cert;

use crate::der;
use crate::{to_spki, BridgeError};

/// `[0] EXPLICIT` context tag for the TBSCertificate version field.
const TAG_CTX_0: u8 = 0xA0;
/// `[3] EXPLICIT` context tag for the TBSCertificate extensions field.
const TAG_CTX_3: u8 = 0xA3;

/// id-Ed25519, used as the shell's (unverified) signature algorithm.
const OID_ED25519: &[u8] = &[0x2B, 0x65, 0x70];

/// Builds a certificate shell for `cert`'s master key, embedding
/// `key_block` in the custom extension when given.
///
/// # Errors
///
/// Fails when the master key's algorithm has no SubjectPublicKeyInfo
/// translation.
pub fn bridge_certificate(cert: &Cert, key_block: Option<&[u8]>) -> Result<Vec<u8>, BridgeError> {
    let spki = to_spki(cert.primary_key().key())?;
    Ok(certificate_with_spki(&spki, key_block))
}

/// Builds a certificate shell around an explicit SubjectPublicKeyInfo.
pub fn certificate_with_spki(spki: &[u8], key_block: Option<&[u8]>) -> Vec<u8> {
    match key_block {
        Some(block) => assemble(spki, Some(&der::bit_string(block))),
        None => assemble(spki, None),
    }
}

/// Builds a certificate shell whose embedded-key extension carries
/// arbitrary bytes instead of a BIT STRING.
pub fn certificate_with_raw_extension(spki: &[u8], raw_value: &[u8]) -> Vec<u8> {
    assemble(spki, Some(raw_value))
}

fn assemble(spki: &[u8], extension_value: Option<&[u8]>) -> Vec<u8> {
    let version = der::tlv(TAG_CTX_0, &der::tlv(der::TAG_INTEGER, &[2]));
    let serial = der::tlv(der::TAG_INTEGER, &[1]);
    let algorithm = der::sequence(&[&der::tlv(der::TAG_OID, OID_ED25519)]);
    let empty_name = der::sequence(&[]);
    let validity = der::sequence(&[
        &der::tlv(der::TAG_UTC_TIME, b"200101000000Z"),
        &der::tlv(der::TAG_UTC_TIME, b"490101000000Z"),
    ]);

    let mut tbs_fields: Vec<Vec<u8>> = vec![
        version,
        serial,
        algorithm.clone(),
        empty_name.clone(),
        validity,
        empty_name,
        spki.to_vec(),
    ];
    if let Some(value) = extension_value {
        let extension = der::sequence(&[
            &der::tlv(der::TAG_OID, der::KEY_BLOCK_OID),
            &der::tlv(der::TAG_OCTET_STRING, value),
        ]);
        tbs_fields.push(der::tlv(TAG_CTX_3, &der::sequence(&[&extension])));
    }

    let refs: Vec<&[u8]> = tbs_fields.iter().map(Vec::as_slice).collect();
    let tbs = der::sequence(&refs);
    der::sequence(&[&tbs, &algorithm, &der::bit_string(&[0u8; 64])])
}
