//! Domain trust registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use trellis_agent::SigningAgent;

use crate::config::TrustConfig;
use crate::orchestrator::DomainTrust;
use crate::TrustError;

/// Lazily-initialized [`DomainTrust`] instances, one per serving domain.
///
/// Domains share a single signing agent; each gets its own anchor and
/// keyring store, opened the first time the domain is requested.
pub struct TrustRegistry {
    config: TrustConfig,
    agent: Arc<Mutex<Box<dyn SigningAgent>>>,
    domains: RwLock<HashMap<String, Arc<DomainTrust>>>,
}

impl TrustRegistry {
    pub fn new(config: TrustConfig, agent: Arc<Mutex<Box<dyn SigningAgent>>>) -> Self {
        Self {
            config,
            agent,
            domains: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the trust handler for `domain`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownDomain`] for domains absent from the
    /// configuration, and propagates failures from opening the domain's
    /// anchor or store.
    pub fn get(&self, domain: &str) -> Result<Arc<DomainTrust>, TrustError> {
        let key = domain.to_ascii_lowercase();

        {
            let domains = self.domains.read().unwrap_or_else(|e| e.into_inner());
            if let Some(trust) = domains.get(&key) {
                return Ok(Arc::clone(trust));
            }
        }

        let config = self
            .config
            .domain(domain)
            .ok_or_else(|| TrustError::UnknownDomain(domain.to_string()))?;

        let mut domains = self.domains.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have opened it while we were unlocked.
        if let Some(trust) = domains.get(&key) {
            return Ok(Arc::clone(trust));
        }
        let trust = Arc::new(DomainTrust::open(config, Arc::clone(&self.agent))?);
        domains.insert(key, Arc::clone(&trust));
        Ok(trust)
    }
}
