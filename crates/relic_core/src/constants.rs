//! Shared constants used across Relic crates.

/// Default admin API port for Relic.
pub const DEFAULT_PORT: u16 = 38500;

/// Default base URL for CLI/API clients.
pub const DEFAULT_CLI_SERVER_URL: &str = "http://localhost:38500";

/// Object-store namespace that separates backups from relic content.
pub const DEFAULT_BACKUP_PREFIX: &str = "db/";

/// Days during which every backup is kept.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Days during which one backup per ISO week is kept.
pub const DEFAULT_RETENTION_WEEKS_DAYS: i64 = 30;

/// Scheduled backup times when `BACKUP_TIMES` is unset.
pub const DEFAULT_BACKUP_TIMES: &str = "02:00,14:00";

/// Local time at which the retention cleanup job fires.
pub const CLEANUP_HOUR: u32 = 3;
/// Minute component of the cleanup job time.
pub const CLEANUP_MINUTE: u32 = 0;

/// Upper bound for a single retention pass in seconds.
pub const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 600;

/// Job id used for the retention cleanup pass.
pub const CLEANUP_JOB_ID: &str = "backup_cleanup";

/// Job id used for manual backups triggered outside the scheduler.
pub const MANUAL_BACKUP_JOB_ID: &str = "backup_manual";

/// Gzip level applied to database dumps.
pub const BACKUP_COMPRESSION_LEVEL: u32 = 9;
