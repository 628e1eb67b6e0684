//! Database backups: key naming, tiered retention, cleanup, and production.
//!
//! A retention pass runs `store list -> decode keys -> classify -> delete`.
//! Nothing about a pass outlives it; the object store is the only state.

/// Retention executor: deletes expired snapshots and reports totals.
pub mod cleanup;
/// Snapshot key encoding and decoding.
pub mod naming;
/// Dump, compress, and upload with bounded retries.
pub mod producer;
/// Daily/weekly/monthly retention classifier.
pub mod retention;
/// Bounded retry policy with a fixed delay schedule.
pub mod retry;
/// Object-store access for snapshot blobs.
pub mod store;

pub use cleanup::{apply, list_snapshots, preview, run_cleanup, CleanupReport, DeleteFailure};
pub use naming::{backup_key, is_backup_filename, parse_backup_timestamp, BackupKind};
pub use producer::{
    dump_source_from_url, parse_database_url, BackupProducer, DatabaseTarget, DumpSource, PgDump,
    ProducedSnapshot, UnavailableSource,
};
pub use retention::{
    classify, newest_first, Classification, RetainedSnapshot, RetentionPolicy, RetentionTier,
};
pub use retry::RetryPolicy;
pub use store::{ObjectStoreSnapshots, SnapshotStore, StoredObject};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One backup object in the store, with the timestamp decoded from its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    /// Store-reported modification time. Informational only.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Build a snapshot from a store listing entry.
    ///
    /// # Errors
    /// Returns [`crate::BackupError::InvalidKeyFormat`] when the key is not a backup key.
    pub fn from_stored(object: StoredObject) -> Result<Self, crate::BackupError> {
        let timestamp = parse_backup_timestamp(&object.key)?;
        Ok(Self {
            key: object.key,
            timestamp,
            size_bytes: object.size,
            last_modified: Some(object.last_modified),
        })
    }

    /// Last path segment of the key, e.g. `backup-2024-01-15-02-00-00.sql.gz`.
    pub fn filename(&self) -> &str {
        naming::filename(&self.key)
    }
}
