//! Keyring merge.
//!
//! A merge unions the signatures of two rings of the same master key into a
//! new ring. Signatures are deduplicated by their exact encoded bytes, never
//! by semantic equivalence, so the result is never smaller than either
//! input. Subkeys, user IDs and user attributes present in only one ring are
//! carried over wholesale.

use std::collections::HashSet;

use sequoia_openpgp::packet::Signature;
use sequoia_openpgp::serialize::SerializeInto;
use sequoia_openpgp::{Cert, Packet, PacketPile};

use crate::PgpError;

fn encode(sig: &Signature) -> Result<Vec<u8>, PgpError> {
    Packet::from(sig.clone())
        .to_vec()
        .map_err(|e| PgpError::InvalidMerge(e.to_string()))
}

/// Appends each signature whose encoding has not been seen yet.
fn push_unseen<'a>(
    packets: &mut Vec<Packet>,
    seen: &mut HashSet<Vec<u8>>,
    sigs: impl Iterator<Item = &'a Signature>,
) -> Result<(), PgpError> {
    for sig in sigs {
        if seen.insert(encode(sig)?) {
            packets.push(Packet::from(sig.clone()));
        }
    }
    Ok(())
}

/// Merges `new` into `old`, producing a new ring.
///
/// # Errors
///
/// Returns [`PgpError::KeyMismatch`] if the rings do not share the same
/// master key, and [`PgpError::InvalidMerge`] if the merged packet sequence
/// cannot be reassembled (which indicates corrupt input).
pub fn merge(old: &Cert, new: &Cert) -> Result<Cert, PgpError> {
    if old.fingerprint() != new.fingerprint() {
        return Err(PgpError::KeyMismatch {
            old: old.fingerprint(),
            new: new.fingerprint(),
        });
    }

    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut packets: Vec<Packet> = Vec::new();

    // Master key, with the direct signatures and revocations of both rings.
    packets.push(Packet::from(old.primary_key().key().clone()));
    push_unseen(&mut packets, &mut seen, old.primary_key().bundle().signatures())?;
    push_unseen(&mut packets, &mut seen, new.primary_key().bundle().signatures())?;

    // User IDs known to the old ring, enriched with the new ring's
    // signatures over the same user ID.
    for ua in old.userids() {
        packets.push(Packet::from(ua.userid().clone()));
        push_unseen(&mut packets, &mut seen, ua.bundle().signatures())?;
        if let Some(nu) = new.userids().find(|n| n.userid() == ua.userid()) {
            push_unseen(&mut packets, &mut seen, nu.bundle().signatures())?;
        }
    }
    // User IDs only the new ring has.
    for ua in new.userids() {
        if old.userids().any(|o| o.userid() == ua.userid()) {
            continue;
        }
        packets.push(Packet::from(ua.userid().clone()));
        push_unseen(&mut packets, &mut seen, ua.bundle().signatures())?;
    }

    // User attributes, same walk.
    for ua in old.user_attributes() {
        packets.push(Packet::from(ua.user_attribute().clone()));
        push_unseen(&mut packets, &mut seen, ua.bundle().signatures())?;
        if let Some(na) = new
            .user_attributes()
            .find(|n| n.user_attribute() == ua.user_attribute())
        {
            push_unseen(&mut packets, &mut seen, na.bundle().signatures())?;
        }
    }
    for ua in new.user_attributes() {
        if old
            .user_attributes()
            .any(|o| o.user_attribute() == ua.user_attribute())
        {
            continue;
        }
        packets.push(Packet::from(ua.user_attribute().clone()));
        push_unseen(&mut packets, &mut seen, ua.bundle().signatures())?;
    }

    // Subkeys; those absent from the old ring are inserted wholesale.
    for ka in old.keys().subkeys() {
        packets.push(Packet::from(ka.key().clone()));
        push_unseen(&mut packets, &mut seen, ka.bundle().signatures())?;
        if let Some(nk) = new
            .keys()
            .subkeys()
            .find(|n| n.key().fingerprint() == ka.key().fingerprint())
        {
            push_unseen(&mut packets, &mut seen, nk.bundle().signatures())?;
        }
    }
    for ka in new.keys().subkeys() {
        if old
            .keys()
            .subkeys()
            .any(|o| o.key().fingerprint() == ka.key().fingerprint())
        {
            continue;
        }
        packets.push(Packet::from(ka.key().clone()));
        push_unseen(&mut packets, &mut seen, ka.bundle().signatures())?;
    }

    Cert::try_from(PacketPile::from(packets)).map_err(|e| PgpError::InvalidMerge(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequoia_openpgp::cert::CertBuilder;
    use sequoia_openpgp::packet::signature::SignatureBuilder;
    use sequoia_openpgp::types::SignatureType;
    use std::time::{Duration, SystemTime};

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

    /// Public-only copy of a generated key, as rings arrive off the wire.
    fn public(cert: &Cert) -> Cert {
        cert.clone().strip_secret_key_material()
    }

    fn certified_copy(signer: &Cert, target: &Cert) -> Cert {
        let mut keypair = signer
            .primary_key()
            .key()
            .clone()
            .parts_into_secret()
            .unwrap()
            .into_keypair()
            .unwrap();
        let ua = target.userids().next().unwrap();
        let sig = SignatureBuilder::new(SignatureType::GenericCertification)
            .sign_userid_binding(&mut keypair, target.primary_key().key(), ua.userid())
            .unwrap();
        target
            .clone()
            .insert_packets([Packet::from(sig)])
            .unwrap()
    }

    fn signature_count(cert: &Cert) -> usize {
        cert.primary_key().bundle().signatures().count()
            + cert
                .userids()
                .map(|ua| ua.bundle().signatures().count())
                .sum::<usize>()
            + cert
                .keys()
                .subkeys()
                .map(|ka| ka.bundle().signatures().count())
                .sum::<usize>()
    }

    #[test]
    fn merge_is_idempotent() {
        let key = public(&gen_key("Alice <alice@example.org>"));
        let merged = merge(&key, &key).unwrap();
        assert_eq!(merged, key);
    }

    #[test]
    fn merge_unions_signatures() {
        let anchor = gen_key("Anchor <anchor@example.org>");
        let base = public(&gen_key("Alice <alice@example.org>"));
        let certified = certified_copy(&anchor, &base);

        let merged = merge(&base, &certified).unwrap();
        assert_eq!(signature_count(&merged), signature_count(&certified));
        assert!(signature_count(&merged) > signature_count(&base));

        // Direction does not matter for the signature set.
        let merged_rev = merge(&certified, &base).unwrap();
        assert_eq!(signature_count(&merged_rev), signature_count(&merged));
    }

    #[test]
    fn remerge_is_a_noop() {
        let anchor = gen_key("Anchor <anchor@example.org>");
        let base = public(&gen_key("Alice <alice@example.org>"));
        let certified = certified_copy(&anchor, &base);

        let merged = merge(&base, &certified).unwrap();
        let reread = crate::ring::read_keyring(&merged.to_vec().unwrap()).unwrap();
        let again = merge(&reread, &certified).unwrap();
        assert_eq!(again, reread);
    }

    #[test]
    fn merge_never_drops_signatures() {
        let anchor_a = gen_key("Anchor A <a@example.org>");
        let anchor_b = gen_key("Anchor B <b@example.org>");
        let base = public(&gen_key("Alice <alice@example.org>"));

        // Two diverging copies, each with a different certification.
        let left = certified_copy(&anchor_a, &base);
        let right = certified_copy(&anchor_b, &base);

        let merged = merge(&left, &right).unwrap();
        assert_eq!(signature_count(&merged), signature_count(&base) + 2);
    }

    #[test]
    fn merge_rejects_different_keys() {
        let a = public(&gen_key("Alice <alice@example.org>"));
        let b = public(&gen_key("Bob <bob@example.org>"));
        assert!(matches!(
            merge(&a, &b),
            Err(PgpError::KeyMismatch { .. })
        ));
    }
}
