//! GnuPG subprocess agent.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use sequoia_openpgp::KeyHandle;

use crate::{hex_id, AgentError, SigningAgent};

/// Signing agent backed by an external GnuPG binary.
///
/// The binary's default keyring must hold the trust anchor's secret key.
/// Certification stages the target key in that keyring, signs it, exports
/// the result and deletes the staged copy again.
pub struct GpgAgent {
    exec: PathBuf,
}

impl GpgAgent {
    /// Creates an agent around the given GnuPG executable.
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self { exec: exec.into() }
    }

    fn invoke(
        &self,
        op: &'static str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, AgentError> {
        tracing::debug!(op, exec = %self.exec.display(), "invoking gpg");

        let mut child = Command::new(&self.exec)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(data) = stdin {
            // Taking the handle drops (and closes) it at the end of the
            // block, which gpg needs to see end of input.
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(data)?;
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Subprocess {
                op,
                status: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

impl SigningAgent for GpgAgent {
    fn import_key(&mut self, data: &[u8]) -> Result<(), AgentError> {
        self.invoke(
            "import",
            &["-q", "--yes", "--batch", "--ignore-time-conflict", "--import"],
            Some(data),
        )?;
        Ok(())
    }

    fn sign_key(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        // Fingerprint of the key to certify, taken from the data itself.
        let ring = trellis_pgp::read_keyring(data)?;
        let fingerprint = ring.fingerprint().to_hex();
        let signer_id = hex_id(signer);

        self.import_key(data)?;
        let signed = (|| {
            self.invoke(
                "sign-key",
                &["--yes", "--batch", "-u", &signer_id, "--sign-key", &fingerprint],
                None,
            )?;
            self.invoke("export", &["--export", &fingerprint], None)
        })();
        // Remove the staged key even when certification failed.
        if let Err(e) = self.invoke(
            "delete-key",
            &["--yes", "--batch", "--delete-key", &fingerprint],
            None,
        ) {
            tracing::warn!(%fingerprint, error = %e, "failed to unstage key after signing");
        }
        signed
    }

    fn sign_data(&mut self, data: &[u8], signer: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        let signer_id = hex_id(signer);
        self.invoke(
            "sign",
            &["--yes", "--batch", "--sign", "-u", &signer_id],
            Some(data),
        )
    }

    fn delete_key(&mut self, handle: &KeyHandle) -> Result<(), AgentError> {
        let id = hex_id(handle);
        self.invoke("delete-key", &["--yes", "--batch", "--delete-key", &id], None)?;
        Ok(())
    }

    fn export_key(&mut self, handle: &KeyHandle) -> Result<Vec<u8>, AgentError> {
        let id = hex_id(handle);
        let out = self.invoke("export", &["--export", &id], None)?;
        if out.is_empty() {
            // gpg exits zero when the key is simply absent.
            return Err(AgentError::UnknownKey(id));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequoia_openpgp::Fingerprint;

    #[test]
    fn missing_executable_is_an_io_error() {
        let mut agent = GpgAgent::new("/nonexistent/gpg2");
        assert!(matches!(
            agent.import_key(b"irrelevant"),
            Err(AgentError::Io(_))
        ));
    }

    #[test]
    fn false_executable_is_a_subprocess_error() {
        let mut agent = GpgAgent::new("/bin/false");
        let handle = KeyHandle::from(
            "0123456789ABCDEF0123456789ABCDEF01234567"
                .parse::<Fingerprint>()
                .unwrap(),
        );
        match agent.delete_key(&handle) {
            Err(AgentError::Subprocess { op, .. }) => assert_eq!(op, "delete-key"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
