//! Retention pass execution: list, classify, delete, report.

use super::retention::{classify, Classification, RetentionPolicy};
use super::store::SnapshotStore;
use super::Snapshot;
use crate::error::{BackupError, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A delete that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub error: String,
    pub not_found: bool,
}

/// Aggregate outcome of applying a classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    /// Sum of `size_bytes` over successful deletes only.
    pub deleted_bytes: u64,
    pub retained: usize,
    pub failures: Vec<DeleteFailure>,
}

impl CleanupReport {
    pub fn deleted_megabytes(&self) -> f64 {
        self.deleted_bytes as f64 / 1024.0 / 1024.0
    }
}

/// List backup snapshots under `prefix`.
///
/// Objects whose keys are not backup keys are skipped.
///
/// # Errors
/// Returns [`BackupError::StoreList`] when the listing itself fails; no
/// partial listing is returned.
pub async fn list_snapshots(
    store: &dyn SnapshotStore,
    prefix: &str,
) -> Result<Vec<Snapshot>, BackupError> {
    let objects = store.list(prefix).await.map_err(BackupError::StoreList)?;
    let mut snapshots = Vec::with_capacity(objects.len());
    for object in objects {
        let key = object.key.clone();
        match Snapshot::from_stored(object) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(err) => tracing::debug!("Skipping non-backup file {}: {}", key, err),
        }
    }
    tracing::debug!("Found {} backups under '{}'", snapshots.len(), prefix);
    Ok(snapshots)
}

/// Delete every snapshot in `classification.delete`; never touch `keep`.
///
/// Each delete is independent. Failures, including keys that are already
/// gone, are logged and recorded and the loop moves on.
pub async fn apply(store: &dyn SnapshotStore, classification: &Classification) -> CleanupReport {
    let mut report = CleanupReport {
        retained: classification.keep.len(),
        ..CleanupReport::default()
    };

    for snapshot in &classification.delete {
        match store.delete(&snapshot.key).await {
            Ok(()) => {
                report.deleted += 1;
                report.deleted_bytes = report.deleted_bytes.saturating_add(snapshot.size_bytes);
                tracing::debug!("Deleted expired backup: {}", snapshot.key);
            }
            Err(source) => {
                let not_found = matches!(source, StoreError::NotFound(_));
                let err = BackupError::StoreDelete {
                    key: snapshot.key.clone(),
                    source,
                };
                tracing::error!("{}", err);
                report.failures.push(DeleteFailure {
                    key: snapshot.key.clone(),
                    error: err.to_string(),
                    not_found,
                });
            }
        }
    }

    report
}

/// List and classify without deleting anything.
///
/// # Errors
/// Propagates [`BackupError::StoreList`].
pub async fn preview(
    store: &dyn SnapshotStore,
    prefix: &str,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<Classification, BackupError> {
    let snapshots = list_snapshots(store, prefix).await?;
    Ok(classify(snapshots, now, policy))
}

/// Run one retention pass.
///
/// # Errors
/// Returns [`BackupError::StoreList`] when the listing fails. Delete failures
/// are reported in the returned [`CleanupReport`] instead.
pub async fn run_cleanup(
    store: &dyn SnapshotStore,
    prefix: &str,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<CleanupReport, BackupError> {
    tracing::info!("Starting backup retention cleanup...");

    let classification = preview(store, prefix, policy, now).await?;
    if classification.is_empty() {
        tracing::info!("No backups found to clean up");
        return Ok(CleanupReport::default());
    }
    if classification.delete.is_empty() {
        tracing::info!(
            "All {} backups are within retention policy",
            classification.keep.len()
        );
        return Ok(CleanupReport {
            retained: classification.keep.len(),
            ..CleanupReport::default()
        });
    }

    let report = apply(store, &classification).await;
    tracing::info!(
        "Cleanup completed: {} backups deleted ({:.2} MB freed), {} backups retained, {} failed",
        report.deleted,
        report.deleted_megabytes(),
        report.retained,
        report.failures.len()
    );
    Ok(report)
}
