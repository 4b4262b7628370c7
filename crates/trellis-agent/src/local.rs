//! In-process signing agent.

use std::collections::HashMap;
use std::io::Write;

use sequoia_openpgp::crypto::KeyPair;
use sequoia_openpgp::packet::signature::SignatureBuilder;
use sequoia_openpgp::serialize::stream::{LiteralWriter, Message, Signer};
use sequoia_openpgp::serialize::SerializeInto;
use sequoia_openpgp::types::SignatureType;
use sequoia_openpgp::{Cert, Fingerprint, KeyHandle, Packet};

use crate::{hex_id, AgentError, SigningAgent};

/// Signing agent that keeps all key material in process memory.
///
/// Signer keys are registered up front with [`LocalAgent::add_signer`];
/// the public keyring behaves like the GnuPG agent's staging keyring.
#[derive(Default)]
pub struct LocalAgent {
    keys: HashMap<Fingerprint, Cert>,
    signers: HashMap<Fingerprint, Cert>,
}

impl LocalAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key the agent may sign with. The ring must carry secret
    /// key material for its master key.
    ///
    /// # Errors
    ///
    /// Fails when `cert` has no secret key material.
    pub fn add_signer(&mut self, cert: Cert) -> Result<(), AgentError> {
        if !cert.is_tsk() {
            return Err(AgentError::Sign(format!(
                "{} has no secret key material",
                cert.fingerprint()
            )));
        }
        self.signers.insert(cert.fingerprint(), cert);
        Ok(())
    }

    fn signer_keypair(&self, handle: &KeyHandle) -> Result<KeyPair, AgentError> {
        let cert = self
            .signers
            .values()
            .find(|c| KeyHandle::from(c.fingerprint()).aliases(handle))
            .ok_or_else(|| AgentError::UnknownKey(hex_id(handle)))?;
        cert.primary_key()
            .key()
            .clone()
            .parts_into_secret()
            .map_err(|e| AgentError::Sign(e.to_string()))?
            .into_keypair()
            .map_err(|e| AgentError::Sign(e.to_string()))
    }

    fn stored(&self, handle: &KeyHandle) -> Option<(&Fingerprint, &Cert)> {
        self.keys
            .iter()
            .find(|(fpr, _)| KeyHandle::from((*fpr).clone()).aliases(handle))
    }
}

impl SigningAgent for LocalAgent {
    fn import_key(&mut self, data: &[u8]) -> Result<(), AgentError> {
        let incoming = trellis_pgp::read_keyring(data)?;
        let fingerprint = incoming.fingerprint();
        let merged = match self.keys.get(&fingerprint) {
            Some(existing) => trellis_pgp::merge(existing, &incoming)?,
            None => incoming,
        };
        self.keys.insert(fingerprint, merged);
        Ok(())
    }

    fn sign_key(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        let ring = trellis_pgp::read_keyring(data)?;
        let mut keypair = self.signer_keypair(signer)?;

        let mut certifications: Vec<Packet> = Vec::new();
        for ua in ring.userids() {
            let sig = SignatureBuilder::new(SignatureType::GenericCertification)
                .sign_userid_binding(&mut keypair, ring.primary_key().key(), ua.userid())
                .map_err(|e| AgentError::Sign(e.to_string()))?;
            certifications.push(Packet::from(sig));
        }

        let certified = ring
            .insert_packets(certifications)
            .map_err(|e| AgentError::Sign(e.to_string()))?;
        certified
            .to_vec()
            .map_err(|e| AgentError::Encode(e.to_string()))
    }

    fn sign_data(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        let keypair = self.signer_keypair(signer)?;

        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let message = Signer::new(message, keypair)
            .build()
            .map_err(|e| AgentError::Sign(e.to_string()))?;
        let mut message = LiteralWriter::new(message)
            .build()
            .map_err(|e| AgentError::Sign(e.to_string()))?;
        message.write_all(data)?;
        message
            .finalize()
            .map_err(|e| AgentError::Sign(e.to_string()))?;
        Ok(sink)
    }

    fn delete_key(&mut self, handle: &KeyHandle) -> Result<(), AgentError> {
        let fingerprint = self
            .stored(handle)
            .map(|(fpr, _)| fpr.clone())
            .ok_or_else(|| AgentError::UnknownKey(hex_id(handle)))?;
        self.keys.remove(&fingerprint);
        Ok(())
    }

    fn export_key(&mut self, handle: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        let (_, cert) = self
            .stored(handle)
            .ok_or_else(|| AgentError::UnknownKey(hex_id(handle)))?;
        cert.to_vec().map_err(|e| AgentError::Encode(e.to_string()))
    }
}
