//! Commitment store interface and reference backends.
//!
//! The registrar only ever creates and reads commitments. A store must treat
//! writes as an idempotent upsert keyed by digest: re-attesting identical
//! content overwrites a record with an equivalent one, so no conflict
//! resolution beyond last-writer-wins is needed.

use crate::serialization::{from_canonical_cbor, to_canonical_cbor};
use crate::types::{AttestationCommitment, Digest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while persisting or reading commitments.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record encoding failed: {0}")]
    Encoding(String),

    #[error("Corrupt record for digest {digest}: {reason}")]
    Corrupt { digest: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable storage of attestation commitments keyed by digest.
#[async_trait]
pub trait CommitmentStore: Send + Sync {
    /// Persist a commitment.
    ///
    /// Must be durable before returning `Ok`, and must never leave a partially
    /// written record behind if it fails or is cancelled.
    async fn store_attestation(&self, record: &AttestationCommitment) -> Result<(), StoreError>;

    /// Fetch the commitment registered under `digest`, if any.
    async fn get_attestation(&self, digest: &Digest) -> Result<Option<AttestationCommitment>, StoreError>;
}

/// In-memory commitment store.
///
/// Not durable across restarts; intended for tests and embedding.
#[derive(Default)]
pub struct MemoryCommitmentStore {
    records: RwLock<HashMap<Digest, AttestationCommitment>>,
}

impl MemoryCommitmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored commitments.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryCommitmentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCommitmentStore")
            .field("records", &self.len())
            .finish()
    }
}

#[async_trait]
impl CommitmentStore for MemoryCommitmentStore {
    async fn store_attestation(&self, record: &AttestationCommitment) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records.insert(record.digest.clone(), record.clone());
        Ok(())
    }

    async fn get_attestation(&self, digest: &Digest) -> Result<Option<AttestationCommitment>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(records.get(digest).cloned())
    }
}

/// File-backed commitment store.
///
/// Each commitment lives in `<root>/<digest>.cbor` as canonical CBOR. Writes
/// land in a uniquely named temporary file that is synced and then renamed
/// over the final path, so readers see either the old record or the new one.
/// The write runs on the blocking pool and the temporary file is removed on
/// drop, so a cancelled `store_attestation` leaves nothing behind.
#[derive(Debug, Clone)]
pub struct FileCommitmentStore {
    root: PathBuf,
}

impl FileCommitmentStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(format!("{digest}.cbor"))
    }
}

fn write_atomic(root: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".commit-")
        .suffix(".tmp")
        .tempfile_in(root)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;

    // Persist the rename itself
    sync_dir(root)?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

// Directories cannot be opened for syncing here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl CommitmentStore for FileCommitmentStore {
    async fn store_attestation(&self, record: &AttestationCommitment) -> Result<(), StoreError> {
        let bytes = to_canonical_cbor(record).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let len = bytes.len();

        let root = self.root.clone();
        let path = self.record_path(&record.digest);
        let written = tokio::task::spawn_blocking(move || write_atomic(&root, &path, &bytes))
            .await
            .map_err(|err| StoreError::Unavailable(format!("write task failed: {err}")))?;

        if let Err(err) = written {
            warn!(digest = %record.digest, error = %err, "commitment write failed");
            return Err(err);
        }

        debug!(digest = %record.digest, bytes = len, "commitment persisted");
        Ok(())
    }

    async fn get_attestation(&self, digest: &Digest) -> Result<Option<AttestationCommitment>, StoreError> {
        let bytes = match tokio::fs::read(self.record_path(digest)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: AttestationCommitment =
            from_canonical_cbor(&bytes).map_err(|e| StoreError::Corrupt {
                digest: digest.to_string(),
                reason: e.to_string(),
            })?;

        if &record.digest != digest {
            return Err(StoreError::Corrupt {
                digest: digest.to_string(),
                reason: format!("record holds digest {}", record.digest),
            });
        }

        Ok(Some(record))
    }
}
