//! Per-domain trust decisions.

use std::sync::{Arc, Mutex};

use sequoia_openpgp::{Fingerprint, KeyHandle};
use serde::{Deserialize, Serialize};

use trellis_agent::SigningAgent;
use trellis_pgp::{master_key, validate, TrustAnchor};
use trellis_store::{KeyRingStore, StoreError, StoreSettings};

use crate::config::DomainConfig;
use crate::TrustError;

/// A successfully authenticated identity: the address the trust anchor
/// certified and the fingerprint of the key it certified it on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The certified address, `local@domain`.
    pub address: String,
    /// Uppercase hex fingerprint of the authenticated key.
    pub fingerprint: String,
}

/// Trust and authentication decisions for one serving domain.
///
/// Pairs the domain's trust anchor and keyring store with a shared signing
/// agent. Every public keyring presented for authentication is imported
/// into the store first, so the store accumulates everything the domain
/// has ever seen about a key.
pub struct DomainTrust {
    domain: String,
    anchor: TrustAnchor,
    store: KeyRingStore,
    agent: Arc<Mutex<Box<dyn SigningAgent>>>,
}

impl DomainTrust {
    /// Assembles a domain trust handler from already-constructed parts.
    pub fn new(
        domain: impl Into<String>,
        anchor: TrustAnchor,
        store: KeyRingStore,
        agent: Arc<Mutex<Box<dyn SigningAgent>>>,
    ) -> Self {
        Self {
            domain: domain.into(),
            anchor,
            store,
            agent,
        }
    }

    /// Opens a domain trust handler from its configuration: loads the
    /// anchor key file and opens the keyring store.
    ///
    /// # Errors
    ///
    /// Fails when the anchor file cannot be read or parsed, or the store
    /// cannot be opened.
    pub fn open(
        config: &DomainConfig,
        agent: Arc<Mutex<Box<dyn SigningAgent>>>,
    ) -> Result<Self, TrustError> {
        let anchor_data = std::fs::read(&config.anchor_key)?;
        let anchor = TrustAnchor::from_bytes(&anchor_data)?;
        let store = KeyRingStore::open(
            &config.store_path.to_string_lossy(),
            StoreSettings::default(),
        )?;
        tracing::info!(
            domain = %config.name,
            anchor = %anchor.fingerprint(),
            "domain trust initialized"
        );
        Ok(Self::new(config.name.clone(), anchor, store, agent))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    pub fn store(&self) -> &KeyRingStore {
        &self.store
    }

    /// Authenticates a presented public keyring.
    ///
    /// The ring is imported (and merged) into the store, then validated
    /// against the domain's trust anchor. Returns `Ok(None)` for every
    /// policy rejection, whether the ring was malformed, uncertified,
    /// expired or revoked; the distinction is logged, not reported.
    ///
    /// # Errors
    ///
    /// Only internal failures (database, pool) surface as errors.
    pub fn authenticate(&self, keyring: &[u8]) -> Result<Option<Identity>, TrustError> {
        let ring = match self.store.import(keyring) {
            Ok(ring) => ring,
            Err(StoreError::Malformed(e)) => {
                tracing::debug!(domain = %self.domain, error = %e, "rejecting unparseable keyring");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match validate(&ring, &self.anchor, &self.domain) {
            Some(uid) => {
                let identity = Identity {
                    address: uid.email,
                    fingerprint: ring.fingerprint().to_hex(),
                };
                tracing::debug!(
                    domain = %self.domain,
                    address = %identity.address,
                    fingerprint = %identity.fingerprint,
                    "keyring authenticated"
                );
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Decides whether an authenticated identity may replace a previously
    /// seen key.
    ///
    /// With no prior fingerprint, or the same fingerprint, there is
    /// nothing to decide and the login proceeds. A changed fingerprint is
    /// accepted only when the prior key is known to the store, still
    /// validates for the same address, and the new key was created
    /// strictly later than the old one. Everything else is a rejection.
    ///
    /// # Errors
    ///
    /// Only internal store failures surface as errors.
    pub fn post_authenticate(
        &self,
        identity: &Identity,
        prior_fingerprint: Option<&str>,
    ) -> Result<bool, TrustError> {
        let Some(prior) = prior_fingerprint else {
            return Ok(true);
        };
        if prior.eq_ignore_ascii_case(&identity.fingerprint) {
            return Ok(true);
        }

        let Ok(old_fpr) = prior.parse::<Fingerprint>() else {
            tracing::debug!(domain = %self.domain, prior, "rejecting unparseable prior fingerprint");
            return Ok(false);
        };
        let Some(old) = self.store.get(&old_fpr)? else {
            tracing::debug!(domain = %self.domain, prior, "prior key unknown, rejecting rollover");
            return Ok(false);
        };
        let Some(old_uid) = validate(&old, &self.anchor, &self.domain) else {
            tracing::debug!(domain = %self.domain, prior, "prior key no longer valid, rejecting rollover");
            return Ok(false);
        };
        if !old_uid.email.eq_ignore_ascii_case(&identity.address) {
            tracing::debug!(
                domain = %self.domain,
                prior_address = %old_uid.email,
                address = %identity.address,
                "prior key belongs to a different address, rejecting rollover"
            );
            return Ok(false);
        }

        let Ok(new_fpr) = identity.fingerprint.parse::<Fingerprint>() else {
            return Ok(false);
        };
        let Some(new) = self.store.get(&new_fpr)? else {
            return Ok(false);
        };

        let accepted =
            master_key(&new).creation_time() > master_key(&old).creation_time();
        if !accepted {
            tracing::debug!(
                domain = %self.domain,
                fingerprint = %identity.fingerprint,
                "replacement key is not newer than the prior key, rejecting rollover"
            );
        }
        Ok(accepted)
    }

    /// Certifies a keyring with the domain's trust anchor, returning the
    /// certified ring.
    ///
    /// # Errors
    ///
    /// Fails when the signing agent cannot certify.
    pub fn sign_key(&self, keyring: &[u8]) -> Result<Vec<u8>, TrustError> {
        let signer = KeyHandle::from(self.anchor.fingerprint().clone());
        let mut agent = self.agent.lock().unwrap_or_else(|e| e.into_inner());
        Ok(agent.sign_key(keyring, &signer)?)
    }

    /// Signs arbitrary data with the domain's trust anchor, producing a
    /// binary OpenPGP message.
    ///
    /// # Errors
    ///
    /// Fails when the signing agent cannot sign.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>, TrustError> {
        let signer = KeyHandle::from(self.anchor.fingerprint().clone());
        let mut agent = self.agent.lock().unwrap_or_else(|e| e.into_inner());
        Ok(agent.sign_data(data, &signer)?)
    }

    /// Checks a revocation proof: imports the presented ring and reports
    /// whether it carries a verifying self-revocation for the claimed
    /// fingerprint.
    ///
    /// Unparseable proofs are not errors, just `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Only internal store failures surface as errors.
    pub fn revoked(&self, keyring: &[u8], claimed_fingerprint: &str) -> Result<bool, TrustError> {
        let ring = match self.store.import(keyring) {
            Ok(ring) => ring,
            Err(StoreError::Malformed(e)) => {
                tracing::debug!(domain = %self.domain, error = %e, "unparseable revocation proof");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(trellis_pgp::is_revoked(&ring)
            && ring
                .fingerprint()
                .to_hex()
                .eq_ignore_ascii_case(claimed_fingerprint))
    }

    /// Exports the stored keyring for a fingerprint, as stored.
    ///
    /// # Errors
    ///
    /// Only internal store failures surface as errors.
    pub fn export_key(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, TrustError> {
        Ok(self.store.export(fingerprint)?)
    }
}
