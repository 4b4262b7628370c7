//! Shared fixtures: a serving domain with an in-process signing agent
//! holding the trust anchor secret, and key generation helpers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sequoia_openpgp::cert::CertBuilder;
use sequoia_openpgp::serialize::SerializeInto;
use sequoia_openpgp::Cert;

use trellis_agent::{LocalAgent, SigningAgent};
use trellis_pgp::TrustAnchor;
use trellis_store::{KeyRingStore, StoreSettings};
use trellis_trust::DomainTrust;

pub const DOMAIN: &str = "example.org";

pub fn t0() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_600_000_000)
}

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// A fresh key with the given user ID and creation time, no expiry.
pub fn key_at(uid: &str, created: SystemTime) -> Cert {
    CertBuilder::new()
        .set_creation_time(created)
        .set_validity_period(None)
        .add_userid(uid)
        .generate()
        .expect("key generation")
        .0
}

/// Public-only encoding of a key, as a client would present it.
pub fn public_bytes(cert: &Cert) -> Vec<u8> {
    cert.clone()
        .strip_secret_key_material()
        .to_vec()
        .expect("serialization")
}

pub struct TestDomain {
    pub trust: DomainTrust,
    pub anchor: Cert,
    _dir: tempfile::TempDir,
}

/// A serving domain backed by a temporary store and a [`LocalAgent`]
/// holding the anchor secret.
pub fn domain() -> TestDomain {
    let anchor = key_at("Trellis Anchor <anchor@example.org>", t0());

    let mut agent = LocalAgent::new();
    agent.add_signer(anchor.clone()).expect("anchor has secrets");
    let agent: Arc<Mutex<Box<dyn SigningAgent>>> = Arc::new(Mutex::new(Box::new(agent)));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keyrings.db");
    let store = KeyRingStore::open(path.to_str().expect("utf-8 path"), StoreSettings::default())
        .expect("store");

    let trust = DomainTrust::new(
        DOMAIN,
        TrustAnchor::from_cert(anchor.clone().strip_secret_key_material()),
        store,
        agent,
    );
    TestDomain {
        trust,
        anchor,
        _dir: dir,
    }
}

/// Runs a key through anchor certification, returning the certified
/// public ring as a client would present it after signup.
pub fn certified_bytes(trust: &DomainTrust, key: &Cert) -> Vec<u8> {
    trust.sign_key(&public_bytes(key)).expect("certification")
}
