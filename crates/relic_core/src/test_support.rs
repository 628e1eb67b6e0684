//! Shared test-only helpers for relic_core.

use crate::backup::naming::{backup_key, BackupKind};
use crate::backup::Snapshot;
use chrono::{DateTime, TimeZone, Utc};

/// Build a UTC timestamp, panicking on invalid input.
pub(crate) fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
        .single()
        .expect("valid UTC timestamp")
}

/// Scheduled snapshot taken at `timestamp`, keyed under `db/`.
pub(crate) fn snapshot_at(timestamp: DateTime<Utc>) -> Snapshot {
    Snapshot {
        key: backup_key("db/", BackupKind::Scheduled, timestamp),
        timestamp,
        size_bytes: 1024,
        last_modified: Some(timestamp),
    }
}
