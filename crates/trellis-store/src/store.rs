//! The keyring store proper.

use std::sync::{Mutex, MutexGuard};

use rusqlite::OptionalExtension;
use sequoia_openpgp::serialize::SerializeInto;
use sequoia_openpgp::{Cert, Fingerprint};

use crate::migrations::run_migrations;
use crate::pool::{create_pool, DbPool, StoreSettings};
use crate::StoreError;

/// Number of import lock stripes. Imports of the same fingerprint must not
/// interleave between the read-merge-write steps; unrelated fingerprints
/// may proceed in parallel.
const LOCK_STRIPES: usize = 16;

/// Persistent keyring storage, keyed by master-key fingerprint.
///
/// Importing a ring whose fingerprint is already present merges the new
/// ring into the stored one instead of replacing it, so certifications
/// accumulated over time are never lost.
pub struct KeyRingStore {
    pool: Mutex<Option<DbPool>>,
    locks: Vec<Mutex<()>>,
}

impl KeyRingStore {
    /// Opens (creating if necessary) the store at `db_path` and brings its
    /// schema up to date.
    ///
    /// # Errors
    ///
    /// Fails when the pool cannot be created or migrations do not apply.
    pub fn open(db_path: &str, settings: StoreSettings) -> Result<Self, StoreError> {
        let pool = create_pool(db_path, settings)?;
        run_migrations(&*pool.get()?)?;
        tracing::debug!(path = db_path, "keyring store opened");

        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Ok(Self {
            pool: Mutex::new(Some(pool)),
            locks,
        })
    }

    fn pool(&self) -> Result<DbPool, StoreError> {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .cloned()
            .ok_or(StoreError::Closed)
    }

    fn stripe(&self, fingerprint: &Fingerprint) -> MutexGuard<'_, ()> {
        let index = fingerprint.as_bytes().last().copied().unwrap_or(0) as usize % LOCK_STRIPES;
        self.locks[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fetch(&self, pool: &DbPool, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, StoreError> {
        let blob = pool
            .get()?
            .query_row(
                "SELECT keyring FROM keyrings WHERE fingerprint = ?1",
                [fingerprint.as_bytes()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob)
    }

    /// Looks up the ring stored under `fingerprint`.
    ///
    /// # Errors
    ///
    /// Fails on database errors, or when a stored blob no longer parses
    /// (which indicates on-disk corruption).
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Cert>, StoreError> {
        let pool = self.pool()?;
        match self.fetch(&pool, fingerprint)? {
            Some(blob) => Ok(Some(trellis_pgp::read_keyring(&blob)?)),
            None => Ok(None),
        }
    }

    /// Returns the raw stored keyring bytes for `fingerprint`.
    pub fn export(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, StoreError> {
        let pool = self.pool()?;
        self.fetch(&pool, fingerprint)
    }

    /// Imports a binary keyring, merging it with any ring already stored
    /// under the same fingerprint, and returns the resulting ring.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] when `data` is not a parseable
    /// public key ring. Database errors surface as [`StoreError::Database`].
    pub fn import(&self, data: &[u8]) -> Result<Cert, StoreError> {
        let incoming = trellis_pgp::read_keyring(data)?;
        let fingerprint = incoming.fingerprint();
        let pool = self.pool()?;

        // Hold the stripe across read, merge and write so concurrent
        // imports of the same key cannot lose each other's signatures.
        let _guard = self.stripe(&fingerprint);

        let merged = match self.fetch(&pool, &fingerprint)? {
            Some(blob) => {
                let existing = trellis_pgp::read_keyring(&blob)?;
                trellis_pgp::merge(&existing, &incoming)?
            }
            None => incoming,
        };

        let blob = merged
            .to_vec()
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        pool.get()?.execute(
            "INSERT INTO keyrings (fingerprint, keyring, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT (fingerprint) DO UPDATE
             SET keyring = excluded.keyring, updated_at = excluded.updated_at",
            rusqlite::params![fingerprint.as_bytes(), blob],
        )?;

        tracing::debug!(fingerprint = %fingerprint, bytes = blob.len(), "keyring imported");
        Ok(merged)
    }

    /// Releases the underlying connection pool. Subsequent operations fail
    /// with [`StoreError::Closed`].
    pub fn close(&self) {
        let mut guard = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            tracing::debug!("keyring store closed");
        }
    }
}
