//! Domain-bound identity validation against the trust anchor.
//!
//! A key is validly bound to an identity in a serving domain when it is not
//! revoked, not expired, and carries at least one user ID whose email domain
//! matches the serving domain and which the trust anchor has certified with
//! a verifying certification signature.

use std::time::{SystemTime, UNIX_EPOCH};

use sequoia_openpgp::packet::key::{PrimaryRole, PublicParts};
use sequoia_openpgp::packet::{Key, Signature};
use sequoia_openpgp::types::SignatureType;
use sequoia_openpgp::{Cert, Fingerprint, KeyID};

use crate::ring::{is_expired_at, is_revoked, master_key, read_keyring};
use crate::uid::UserId;
use crate::PgpError;

/// The server-operated trust anchor for one serving domain.
///
/// Holds only public key material; the private half lives behind the
/// signing agent. Loaded once at startup and never stored in the keyring
/// store.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    cert: Cert,
    fingerprint: Fingerprint,
    keyid: KeyID,
}

impl TrustAnchor {
    /// Loads the anchor from a binary OpenPGP public key block.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PgpError> {
        Ok(Self::from_cert(read_keyring(data)?))
    }

    /// Wraps an already-parsed keyring as the trust anchor.
    pub fn from_cert(cert: Cert) -> Self {
        let fingerprint = cert.fingerprint();
        let keyid = cert.keyid();
        TrustAnchor {
            cert,
            fingerprint,
            keyid,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn keyid(&self) -> &KeyID {
        &self.keyid
    }

    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    fn key(&self) -> &Key<PublicParts, PrimaryRole> {
        self.cert.primary_key().key()
    }
}

/// The signature purposes distinguished when scanning certifications.
///
/// Only basic and casual certifications authorize a user ID; everything
/// else (positive/persona certifications, revocations, unrelated types) is
/// ignored by the identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificationKind {
    Generic,
    Casual,
    Revocation,
    Other,
}

impl From<SignatureType> for CertificationKind {
    fn from(typ: SignatureType) -> Self {
        match typ {
            SignatureType::GenericCertification => CertificationKind::Generic,
            SignatureType::CasualCertification => CertificationKind::Casual,
            SignatureType::CertificationRevocation => CertificationKind::Revocation,
            _ => CertificationKind::Other,
        }
    }
}

impl CertificationKind {
    /// Whether a signature of this kind can authorize a user ID.
    pub fn authorizes(self) -> bool {
        matches!(self, CertificationKind::Generic | CertificationKind::Casual)
    }
}

fn issued_by_anchor(sig: &Signature, anchor: &TrustAnchor) -> bool {
    sig.issuer_fingerprints()
        .any(|fpr| fpr == anchor.fingerprint())
        || sig.issuers().any(|keyid| keyid == anchor.keyid())
}

/// Validates a keyring for the serving domain at the given instant.
///
/// Returns the user ID authorized by the most recent verifying trust-anchor
/// certification, or `None` if the key is revoked, expired, or carries no
/// domain-bound certified user ID. The rejection reason is logged but not
/// reported; callers present a uniform failure.
pub fn validate_at(
    cert: &Cert,
    anchor: &TrustAnchor,
    domain: &str,
    now: SystemTime,
) -> Option<UserId> {
    if is_revoked(cert) {
        tracing::debug!(fingerprint = %cert.fingerprint(), "rejecting revoked key");
        return None;
    }
    if is_expired_at(cert, now) {
        tracing::debug!(fingerprint = %cert.fingerprint(), "rejecting expired key");
        return None;
    }

    let pk = master_key(cert);
    let mut best: Option<(SystemTime, UserId)> = None;

    for ua in cert.userids() {
        let raw = String::from_utf8_lossy(ua.userid().value()).into_owned();
        let Some(uid) = UserId::parse(&raw) else {
            continue;
        };
        if !uid
            .domain()
            .is_some_and(|d| d.eq_ignore_ascii_case(domain))
        {
            continue;
        }

        for sig in ua.bundle().certifications() {
            if !CertificationKind::from(sig.typ()).authorizes() {
                continue;
            }
            if !issued_by_anchor(sig, anchor) {
                continue;
            }
            if sig
                .clone()
                .verify_userid_binding(anchor.key(), pk, ua.userid())
                .is_err()
            {
                continue;
            }
            let created = sig.signature_creation_time().unwrap_or(UNIX_EPOCH);
            if best.as_ref().map_or(true, |(at, _)| created > *at) {
                best = Some((created, uid.clone()));
            }
        }
    }

    if best.is_none() {
        tracing::debug!(
            fingerprint = %cert.fingerprint(),
            domain,
            "key has no trust-anchor certified user id for this domain"
        );
    }
    best.map(|(_, uid)| uid)
}

/// Validates a keyring for the serving domain right now.
pub fn validate(cert: &Cert, anchor: &TrustAnchor, domain: &str) -> Option<UserId> {
    validate_at(cert, anchor, domain, SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequoia_openpgp::cert::CertBuilder;
    use sequoia_openpgp::packet::signature::SignatureBuilder;
    use sequoia_openpgp::Packet;
    use std::time::Duration;

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    }

    fn gen_key(uid: &str) -> Cert {
        CertBuilder::new()
            .set_creation_time(t0())
            .set_validity_period(None)
            .add_userid(uid)
            .generate()
            .expect("key generation")
            .0
    }

    /// Certifies every user ID of `target` under `signer`'s primary key.
    fn certify(signer: &Cert, target: &Cert, typ: SignatureType) -> Cert {
        let mut keypair = signer
            .primary_key()
            .key()
            .clone()
            .parts_into_secret()
            .unwrap()
            .into_keypair()
            .unwrap();
        let mut packets = Vec::new();
        for ua in target.userids() {
            let sig = SignatureBuilder::new(typ)
                .sign_userid_binding(&mut keypair, target.primary_key().key(), ua.userid())
                .unwrap();
            packets.push(Packet::from(sig));
        }
        target.clone().insert_packets(packets).unwrap()
    }

    #[test]
    fn accepts_anchor_certified_domain_uid() {
        let anchor_cert = gen_key("Trellis Anchor <anchor@example.org>");
        let anchor = TrustAnchor::from_cert(anchor_cert.clone());

        let client = gen_key("Alice <alice@example.org>");
        assert!(validate_at(&client, &anchor, "example.org", t0()).is_none());

        let certified = certify(&anchor_cert, &client, SignatureType::GenericCertification);
        let uid = validate_at(&certified, &anchor, "example.org", t0()).unwrap();
        assert_eq!(uid.email, "alice@example.org");
    }

    #[test]
    fn accepts_casual_certification() {
        let anchor_cert = gen_key("Trellis Anchor <anchor@example.org>");
        let anchor = TrustAnchor::from_cert(anchor_cert.clone());
        let client = gen_key("Alice <alice@example.org>");

        let certified = certify(&anchor_cert, &client, SignatureType::CasualCertification);
        assert!(validate_at(&certified, &anchor, "example.org", t0()).is_some());
    }

    #[test]
    fn rejects_wrong_domain() {
        let anchor_cert = gen_key("Trellis Anchor <anchor@example.org>");
        let anchor = TrustAnchor::from_cert(anchor_cert.clone());
        let client = gen_key("Alice <alice@elsewhere.net>");

        let certified = certify(&anchor_cert, &client, SignatureType::GenericCertification);
        assert!(validate_at(&certified, &anchor, "example.org", t0()).is_none());
    }

    #[test]
    fn rejects_foreign_certifier() {
        let anchor = TrustAnchor::from_cert(gen_key("Trellis Anchor <anchor@example.org>"));
        let impostor = gen_key("Impostor <impostor@example.org>");
        let client = gen_key("Alice <alice@example.org>");

        let certified = certify(&impostor, &client, SignatureType::GenericCertification);
        assert!(validate_at(&certified, &anchor, "example.org", t0()).is_none());
    }

    #[test]
    fn domain_comparison_is_case_insensitive() {
        let anchor_cert = gen_key("Trellis Anchor <anchor@example.org>");
        let anchor = TrustAnchor::from_cert(anchor_cert.clone());
        let client = gen_key("Alice <alice@Example.ORG>");

        let certified = certify(&anchor_cert, &client, SignatureType::GenericCertification);
        assert!(validate_at(&certified, &anchor, "example.org", t0()).is_some());
    }

    #[test]
    fn rejects_expired_even_if_certified(){
        let anchor_cert = gen_key("Trellis Anchor <anchor@example.org>");
        let anchor = TrustAnchor::from_cert(anchor_cert.clone());
        let client = CertBuilder::new()
            .set_creation_time(t0())
            .set_validity_period(Duration::from_secs(3600))
            .add_userid("Alice <alice@example.org>")
            .generate()
            .unwrap()
            .0;

        let certified = certify(&anchor_cert, &client, SignatureType::GenericCertification);
        assert!(validate_at(&certified, &anchor, "example.org", t0()).is_some());
        let later = t0() + Duration::from_secs(7200);
        assert!(validate_at(&certified, &anchor, "example.org", later).is_none());
    }
}
