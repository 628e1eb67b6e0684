//! Core domain library for Relic backups (config, key naming, retention, scheduling).

/// Database backups: naming, retention, cleanup, and production.
pub mod backup;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants and defaults.
pub mod constants;
/// Process-global environment helpers.
pub mod env;
/// Application error types (storage/domain).
pub mod error;
/// Background job scheduling.
pub mod scheduler;

pub use backup::{
    BackupKind, BackupProducer, Classification, CleanupReport, RetentionPolicy, RetentionTier,
    Snapshot, SnapshotStore,
};
pub use config::{BackupConfig, Config};
pub use constants::*;
pub use error::{AppError, BackupError, StoreError};
pub use scheduler::{JobRegistry, Scheduler, Trigger};

#[cfg(test)]
pub(crate) mod test_support;
