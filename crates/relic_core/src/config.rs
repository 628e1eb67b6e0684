//! Configuration loading from environment variables.

use crate::backup::RetentionPolicy;
use crate::constants::{
    DEFAULT_BACKUP_PREFIX, DEFAULT_BACKUP_TIMES, DEFAULT_CLEANUP_TIMEOUT_SECS, DEFAULT_PORT,
    DEFAULT_RETENTION_DAYS, DEFAULT_RETENTION_WEEKS_DAYS,
};
use chrono_tz::Tz;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the Relic maintenance service.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage_dsn: String,
    pub database_url: String,
    pub backup: BackupConfig,
}

/// Backup scheduling and retention settings.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub enabled: bool,
    pub times: Vec<BackupTime>,
    pub timezone: Tz,
    pub retention_days: i64,
    pub retention_weeks_days: i64,
    pub cleanup_enabled: bool,
    pub on_startup: bool,
    pub on_shutdown: bool,
    pub prefix: String,
    pub cleanup_timeout: Duration,
}

impl BackupConfig {
    /// Retention windows consumed by the classifier.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention_days: self.retention_days,
            retention_weeks_days: self.retention_weeks_days,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            times: parse_backup_times(DEFAULT_BACKUP_TIMES).unwrap_or_default(),
            timezone: Tz::UTC,
            retention_days: DEFAULT_RETENTION_DAYS,
            retention_weeks_days: DEFAULT_RETENTION_WEEKS_DAYS,
            cleanup_enabled: true,
            on_startup: true,
            on_shutdown: true,
            prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            cleanup_timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECS),
        }
    }
}

/// Wall-clock time of day (`HH:MM`) at which a scheduled backup fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackupTime {
    pub hour: u32,
    pub minute: u32,
}

impl fmt::Display for BackupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for BackupTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (hour, minute) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{}'", trimmed))?;
        let hour: u32 = hour
            .trim()
            .parse()
            .map_err(|_| format!("invalid hour in '{}'", trimmed))?;
        let minute: u32 = minute
            .trim()
            .parse()
            .map_err(|_| format!("invalid minute in '{}'", trimmed))?;
        if hour > 23 || minute > 59 {
            return Err(format!("time out of range: '{}'", trimmed));
        }
        Ok(Self { hour, minute })
    }
}

/// Parse a comma-separated list of `HH:MM` times.
///
/// Empty entries are ignored and duplicates collapse, so `"14:00, 02:00,02:00"`
/// yields two sorted times.
///
/// # Errors
/// Returns a message naming the first entry that is not a valid time.
pub fn parse_backup_times(value: &str) -> Result<Vec<BackupTime>, String> {
    let mut times = value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(BackupTime::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    times.sort();
    times.dedup();
    Ok(times)
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows USERPROFILE (standard)
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

fn default_storage_dsn() -> String {
    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
    let storage_dir = home.join(".cache").join("relic").join("storage");
    format!("file://{}", storage_dir.to_string_lossy())
}

fn storage_dsn_from_env() -> String {
    match env::var("STORAGE_DSN") {
        Ok(value) if !value.trim().is_empty() => match value.trim().strip_prefix("file://~/") {
            Some(rest) => format!("file://{}", expand_tilde(format!("~/{}", rest))),
            None => value.trim().to_string(),
        },
        _ => default_storage_dsn(),
    }
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment, falling back to `default`
/// when the variable is missing or unrecognized.
pub fn env_flag_or(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(default)
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env_flag_or(name, false)
}

fn env_parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn backup_times_from_env() -> Vec<BackupTime> {
    let raw = env::var("BACKUP_TIMES").unwrap_or_else(|_| DEFAULT_BACKUP_TIMES.to_string());
    match parse_backup_times(&raw) {
        Ok(times) if !times.is_empty() => times,
        Ok(_) => {
            tracing::warn!(
                "BACKUP_TIMES is empty; falling back to {}",
                DEFAULT_BACKUP_TIMES
            );
            parse_backup_times(DEFAULT_BACKUP_TIMES).unwrap_or_default()
        }
        Err(err) => {
            tracing::warn!(
                "Invalid BACKUP_TIMES='{}': {}. Falling back to {}",
                raw,
                err,
                DEFAULT_BACKUP_TIMES
            );
            parse_backup_times(DEFAULT_BACKUP_TIMES).unwrap_or_default()
        }
    }
}

fn timezone_from_env() -> Tz {
    let Ok(raw) = env::var("BACKUP_TIMEZONE") else {
        return Tz::UTC;
    };
    match raw.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(err) => {
            tracing::warn!(
                "Invalid BACKUP_TIMEZONE='{}': {}. Falling back to UTC",
                raw,
                err
            );
            Tz::UTC
        }
    }
}

fn backup_prefix_from_env() -> String {
    let raw = env::var("BACKUP_PREFIX").unwrap_or_else(|_| DEFAULT_BACKUP_PREFIX.to_string());
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

impl BackupConfig {
    /// Load backup settings from environment variables.
    pub fn from_env() -> Self {
        let config = Self {
            enabled: env_flag_enabled("BACKUP_ENABLED"),
            times: backup_times_from_env(),
            timezone: timezone_from_env(),
            retention_days: env_parsed_or("BACKUP_RETENTION_DAYS", DEFAULT_RETENTION_DAYS),
            retention_weeks_days: env_parsed_or(
                "BACKUP_RETENTION_WEEKS",
                DEFAULT_RETENTION_WEEKS_DAYS,
            ),
            cleanup_enabled: env_flag_or("BACKUP_CLEANUP_ENABLED", true),
            on_startup: env_flag_or("BACKUP_ON_STARTUP", true),
            on_shutdown: env_flag_or("BACKUP_ON_SHUTDOWN", true),
            prefix: backup_prefix_from_env(),
            cleanup_timeout: Duration::from_secs(env_parsed_or(
                "BACKUP_CLEANUP_TIMEOUT_SECS",
                DEFAULT_CLEANUP_TIMEOUT_SECS,
            )),
        };
        for warning in config.retention_policy().validate() {
            tracing::warn!("Backup retention configuration: {}", warning);
        }
        config
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        Self {
            port: env_parsed_or("PORT", DEFAULT_PORT),
            storage_dsn: storage_dsn_from_env(),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://postgres@localhost:5432/relic".to_string()),
            backup: BackupConfig::from_env(),
        }
    }
}
