//! Trust layer configuration.
//!
//! Deployment settings arrive as a TOML document: the GnuPG executable
//! backing the signing agent and one `[[domains]]` table per serving
//! domain, each naming the trust anchor key file and the keyring database
//! location.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Signing agent settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Path of the GnuPG executable whose keyring holds the anchor
    /// secrets.
    #[serde(default = "default_gpg_exec")]
    pub gpg_exec: PathBuf,
}

fn default_gpg_exec() -> PathBuf {
    PathBuf::from("/usr/bin/gpg2")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gpg_exec: default_gpg_exec(),
        }
    }
}

/// Per-domain trust settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    /// The serving domain.
    pub name: String,

    /// Binary OpenPGP public key block of the domain's trust anchor.
    pub anchor_key: PathBuf,

    /// SQLite database holding the domain's keyring store.
    pub store_path: PathBuf,
}

/// Top-level trust configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Signing agent settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Serving domains, one table per domain.
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

impl TrustConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed or unknown fields.
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Loads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&input)
    }

    /// Looks up the settings for a serving domain, case-insensitively.
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = TrustConfig::from_toml(
            r#"
            [agent]
            gpg_exec = "/opt/gnupg/bin/gpg2"

            [[domains]]
            name = "example.org"
            anchor_key = "/etc/trellis/example.org/anchor.pgp"
            store_path = "/var/lib/trellis/example.org/keyrings.db"

            [[domains]]
            name = "example.net"
            anchor_key = "/etc/trellis/example.net/anchor.pgp"
            store_path = "/var/lib/trellis/example.net/keyrings.db"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.agent.gpg_exec, PathBuf::from("/opt/gnupg/bin/gpg2"));
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.domains[0].name, "example.org");
    }

    #[test]
    fn agent_section_is_optional() {
        let config = TrustConfig::from_toml(
            r#"
            [[domains]]
            name = "example.org"
            anchor_key = "/etc/anchor.pgp"
            store_path = "/var/keyrings.db"
            "#,
        )
        .expect("config should parse");
        assert_eq!(config.agent.gpg_exec, PathBuf::from("/usr/bin/gpg2"));
    }

    #[test]
    fn domain_lookup_is_case_insensitive() {
        let config = TrustConfig::from_toml(
            r#"
            [[domains]]
            name = "Example.ORG"
            anchor_key = "/etc/anchor.pgp"
            store_path = "/var/keyrings.db"
            "#,
        )
        .unwrap();

        assert!(config.domain("example.org").is_some());
        assert!(config.domain("EXAMPLE.ORG").is_some());
        assert!(config.domain("example.net").is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            TrustConfig::from_toml("[agent]\ntypo_field = 1\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
