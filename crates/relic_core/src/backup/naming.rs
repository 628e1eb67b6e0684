//! Snapshot key naming.
//!
//! Two key shapes are stored and must stay bit-exact:
//! - `<prefix>backup-YYYY-MM-DD-HH-MM-SS.sql.gz` for scheduled and manual backups
//! - `<prefix>backup-YYYY-MM-DD-{startup|shutdown}.sql.gz` for lifecycle backups
//!
//! Lifecycle keys carry only the date so repeated restarts on one UTC day
//! overwrite a single object instead of piling up.

use crate::error::BackupError;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const FILENAME_PREFIX: &str = "backup-";
const FILENAME_SUFFIX: &str = ".sql.gz";

/// Time of day assigned to marker keys, which store no time component.
pub const MARKER_TIME: (u32, u32, u32) = (12, 0, 0);

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Scheduled,
    Manual,
    Startup,
    Shutdown,
}

impl BackupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
        }
    }

    /// Marker word embedded in the key instead of a time of day, if any.
    pub fn marker(self) -> Option<&'static str> {
        match self {
            Self::Startup | Self::Shutdown => Some(self.as_str()),
            Self::Scheduled | Self::Manual => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            "startup" => Ok(Self::Startup),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(format!("unknown backup kind '{}'", other)),
        }
    }
}

fn exact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"backup-(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})\.sql\.gz")
            .unwrap_or_else(|err| panic!("exact backup key pattern must compile: {err}"))
    })
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"backup-(\d{4})-(\d{2})-(\d{2})-(startup|shutdown)\.sql\.gz")
            .unwrap_or_else(|err| panic!("marker backup key pattern must compile: {err}"))
    })
}

/// Encode the object key for a backup of `kind` taken at `now`.
///
/// # Arguments
/// - `prefix`: Folder-style namespace, e.g. `db/`.
/// - `kind`: Backup kind; marker kinds drop the time of day.
/// - `now`: Capture time.
pub fn backup_key(prefix: &str, kind: BackupKind, now: DateTime<Utc>) -> String {
    match kind.marker() {
        Some(marker) => format!(
            "{}{}{}-{}{}",
            prefix,
            FILENAME_PREFIX,
            now.format("%Y-%m-%d"),
            marker,
            FILENAME_SUFFIX
        ),
        None => format!(
            "{}{}{}{}",
            prefix,
            FILENAME_PREFIX,
            now.format("%Y-%m-%d-%H-%M-%S"),
            FILENAME_SUFFIX
        ),
    }
}

fn capture_u32(captures: &regex::Captures<'_>, index: usize) -> Option<u32> {
    captures.get(index)?.as_str().parse().ok()
}

fn utc_from_parts(
    key: &str,
    date: (u32, u32, u32),
    time: (u32, u32, u32),
) -> Result<DateTime<Utc>, BackupError> {
    let invalid = || BackupError::InvalidKeyFormat(key.to_string());
    let (year, month, day) = date;
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).map_err(|_| invalid())?, month, day)
        .ok_or_else(invalid)?;
    let time = NaiveTime::from_hms_opt(time.0, time.1, time.2).ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Decode the UTC timestamp encoded in a backup key.
///
/// The key is searched rather than matched whole, so directory prefixes are
/// accepted. The exact shape is tried before the marker shape; marker keys
/// decode to 12:00:00 UTC on their date.
///
/// # Errors
/// Returns [`BackupError::InvalidKeyFormat`] when neither shape is present or
/// the embedded date/time is out of range.
pub fn parse_backup_timestamp(key: &str) -> Result<DateTime<Utc>, BackupError> {
    let invalid = || BackupError::InvalidKeyFormat(key.to_string());

    if let Some(captures) = exact_pattern().captures(key) {
        let mut parts = [0u32; 6];
        for (slot, index) in parts.iter_mut().zip(1..=6) {
            *slot = capture_u32(&captures, index).ok_or_else(invalid)?;
        }
        return utc_from_parts(
            key,
            (parts[0], parts[1], parts[2]),
            (parts[3], parts[4], parts[5]),
        );
    }

    if let Some(captures) = marker_pattern().captures(key) {
        let year = capture_u32(&captures, 1).ok_or_else(invalid)?;
        let month = capture_u32(&captures, 2).ok_or_else(invalid)?;
        let day = capture_u32(&captures, 3).ok_or_else(invalid)?;
        return utc_from_parts(key, (year, month, day), MARKER_TIME);
    }

    Err(invalid())
}

/// Last `/`-separated segment of a key.
pub fn filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Whether `name` looks like a bare backup filename (no directories).
pub fn is_backup_filename(name: &str) -> bool {
    name.starts_with(FILENAME_PREFIX)
        && name.ends_with(FILENAME_SUFFIX)
        && !name.contains('/')
        && !name.contains("..")
}
