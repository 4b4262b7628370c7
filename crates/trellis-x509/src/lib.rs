//! X.509 bridge certificates.
//!
//! Clients authenticate the TLS channel with an X.509 certificate that
//! embeds their OpenPGP public key block in a custom extension. Before any
//! trust decision, the bridge proves that the certificate and the embedded
//! key describe the same cryptographic key: the embedded ring's master key
//! is converted to a generic SubjectPublicKeyInfo encoding and compared
//! byte-for-byte against the certificate's own key. OpenPGP keys do not
//! participate in the TLS handshake directly, so this binding is what ties
//! the channel to the holder of the claimed key.

use thiserror::Error;
use x509_parser::prelude::*;

mod der;
pub mod spki;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use spki::to_spki;

/// Dotted form of the embedded-key extension's object identifier.
pub const KEY_BLOCK_OID: &str = "2.25.49058212633447845622587297037800555803";

/// Errors produced while bridging a certificate to its embedded key.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The certificate itself could not be parsed.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// The embedded-key extension is present but unusable.
    #[error("malformed key extension: {0}")]
    MalformedExtension(String),

    /// The key uses an algorithm the bridge cannot translate.
    #[error("unsupported public key algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

fn parse_certificate(cert_der: &[u8]) -> Result<X509Certificate<'_>, BridgeError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| BridgeError::MalformedCertificate(e.to_string()))?;
    Ok(cert)
}

fn key_block_of(cert: &X509Certificate<'_>) -> Result<Option<Vec<u8>>, BridgeError> {
    let Some(ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.as_bytes() == der::KEY_BLOCK_OID)
    else {
        return Ok(None);
    };
    Ok(Some(der::parse_bit_string(ext.value)?.to_vec()))
}

/// Extracts the embedded OpenPGP public key block, if any.
///
/// Returns `Ok(None)` when the extension is absent.
///
/// # Errors
///
/// Fails when the certificate cannot be parsed or the extension is present
/// but malformed.
pub fn extract_key_block(cert_der: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
    key_block_of(&parse_certificate(cert_der)?)
}

/// Extracts the embedded key block and confirms it matches the
/// certificate's own public key.
///
/// Returns the key block only when the embedded ring's master key, encoded
/// as a SubjectPublicKeyInfo structure, equals the certificate's
/// SubjectPublicKeyInfo byte-for-byte. A mismatch yields `Ok(None)`, same
/// as an absent extension; which check failed is not reported.
pub fn matching_key_block(cert_der: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
    let cert = parse_certificate(cert_der)?;
    let Some(block) = key_block_of(&cert)? else {
        return Ok(None);
    };

    let ring = trellis_pgp::read_keyring(&block)
        .map_err(|e| BridgeError::MalformedExtension(e.to_string()))?;
    let derived = to_spki(trellis_pgp::master_key(&ring))?;

    if derived.as_slice() == cert.public_key().raw {
        tracing::debug!(fingerprint = %ring.fingerprint(), "bridge certificate matches embedded key");
        Ok(Some(block))
    } else {
        tracing::debug!("embedded key does not match certificate key");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequoia_openpgp::cert::CertBuilder;
    use sequoia_openpgp::serialize::SerializeInto;

    fn client_key() -> sequoia_openpgp::Cert {
        CertBuilder::new()
            .add_userid("Alice <alice@example.org>")
            .generate()
            .unwrap()
            .0
    }

    #[test]
    fn extracts_and_matches_embedded_key() {
        let key = client_key();
        let block = key.to_vec().unwrap();
        let cert_der = testkit::bridge_certificate(&key, Some(&block)).unwrap();

        assert_eq!(extract_key_block(&cert_der).unwrap().unwrap(), block);
        assert_eq!(matching_key_block(&cert_der).unwrap().unwrap(), block);
    }

    #[test]
    fn absent_extension_is_none() {
        let key = client_key();
        let cert_der = testkit::bridge_certificate(&key, None).unwrap();
        assert!(extract_key_block(&cert_der).unwrap().is_none());
        assert!(matching_key_block(&cert_der).unwrap().is_none());
    }

    #[test]
    fn mismatched_key_is_rejected_silently() {
        let key = client_key();
        // Embed a different key's block.
        let other = client_key();
        let block = other.to_vec().unwrap();
        let cert_der = testkit::bridge_certificate(&key, Some(&block)).unwrap();

        assert!(extract_key_block(&cert_der).unwrap().is_some());
        assert!(matching_key_block(&cert_der).unwrap().is_none());
    }

    #[test]
    fn single_byte_spki_difference_is_rejected() {
        let key = client_key();
        let block = key.to_vec().unwrap();
        let mut spki = to_spki(key.primary_key().key()).unwrap();
        // Flip one bit of the embedded point.
        let last = spki.len() - 1;
        spki[last] ^= 0x01;
        let cert_der = testkit::certificate_with_spki(&spki, Some(&block));

        assert!(matching_key_block(&cert_der).unwrap().is_none());
    }

    #[test]
    fn malformed_extension_is_an_error() {
        let key = client_key();
        let cert_der = testkit::certificate_with_raw_extension(
            &to_spki(key.primary_key().key()).unwrap(),
            b"\xff\xff\xff",
        );
        assert!(matches!(
            extract_key_block(&cert_der),
            Err(BridgeError::MalformedExtension(_))
        ));
    }

    #[test]
    fn garbage_certificate_is_an_error() {
        assert!(matches!(
            extract_key_block(b"not a certificate"),
            Err(BridgeError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn unparsable_key_block_is_an_error() {
        let key = client_key();
        let cert_der = testkit::certificate_with_spki(
            &to_spki(key.primary_key().key()).unwrap(),
            Some(b"not a keyring"),
        );
        assert!(matches!(
            matching_key_block(&cert_der),
            Err(BridgeError::MalformedExtension(_))
        ));
    }
}
