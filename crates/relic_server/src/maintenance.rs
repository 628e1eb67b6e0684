//! Background maintenance: scheduled backups, retention cleanup, lifecycle snapshots.
//!
//! Scheduled runs and admin-triggered runs share the [`JobRegistry`] in
//! [`AppState`], so a cleanup requested over HTTP never overlaps the 03:00
//! pass and vice versa.

use crate::AppState;
use chrono::{DateTime, Utc};
use relic_core::backup::{run_cleanup, BackupKind, CleanupReport, ProducedSnapshot};
use relic_core::config::BackupTime;
use relic_core::scheduler::{Job, JobGuard, JobRegistryError, Scheduler, Trigger};
use relic_core::{AppError, CLEANUP_HOUR, CLEANUP_JOB_ID, CLEANUP_MINUTE, MANUAL_BACKUP_JOB_ID};

/// Scheduler job id for a daily backup at `time`, e.g. `backup_0200`.
pub fn backup_job_id(time: BackupTime) -> String {
    format!("backup_{:02}{:02}", time.hour, time.minute)
}

/// Build (but do not start) the maintenance scheduler.
///
/// Nothing is scheduled unless backups are enabled. The cleanup job is added
/// only when cleanup is enabled as well.
pub fn build_scheduler(state: &AppState) -> Scheduler {
    let backup = &state.config.backup;
    let mut scheduler = Scheduler::with_registry(backup.timezone, state.jobs.clone());
    if !backup.enabled {
        return scheduler;
    }

    for time in &backup.times {
        let Some(trigger) = Trigger::daily(time.hour, time.minute) else {
            tracing::warn!("Ignoring out-of-range backup time {}", time);
            continue;
        };
        let producer = state.producer.clone();
        scheduler.add_job(Job::new(backup_job_id(*time), trigger, move || {
            let producer = producer.clone();
            async move {
                // Failures are logged by the producer.
                let _ = producer.produce_snapshot(BackupKind::Scheduled).await;
            }
        }));
    }

    if backup.cleanup_enabled {
        let cleanup_state = state.clone();
        scheduler.add_job(Job::new(
            CLEANUP_JOB_ID,
            Trigger::Daily {
                hour: CLEANUP_HOUR,
                minute: CLEANUP_MINUTE,
            },
            move || {
                let state = cleanup_state.clone();
                async move {
                    if let Err(err) = cleanup_pass(&state, Utc::now()).await {
                        tracing::error!("Cleanup failed: {}", err);
                    }
                }
            },
        ));
    }

    scheduler
}

fn claim(state: &AppState, job_id: &str) -> Result<JobGuard, AppError> {
    state.jobs.try_acquire(job_id).map_err(|err| match err {
        JobRegistryError::Busy { .. } => AppError::Conflict(err.to_string()),
        JobRegistryError::Poisoned => {
            tracing::error!("{}", err);
            AppError::Internal
        }
    })
}

/// One retention pass bounded by the configured timeout. Callers hold the
/// cleanup guard.
///
/// # Errors
/// Returns [`AppError::Backup`] when listing fails, or [`AppError::Internal`]
/// when the pass exceeds its timeout.
pub async fn cleanup_pass(state: &AppState, now: DateTime<Utc>) -> Result<CleanupReport, AppError> {
    let timeout = state.config.backup.cleanup_timeout;
    let policy = state.config.backup.retention_policy();
    let pass = run_cleanup(state.store.as_ref(), state.prefix(), &policy, now);
    match tokio::time::timeout(timeout, pass).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::error!("Backup cleanup timed out after {:?}", timeout);
            Err(AppError::Internal)
        }
    }
}

/// Run a retention pass unless one is already in progress.
///
/// # Errors
/// Returns [`AppError::Conflict`] while another pass holds the cleanup guard,
/// plus anything [`cleanup_pass`] returns.
pub async fn run_guarded_cleanup(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<CleanupReport, AppError> {
    let _guard = claim(state, CLEANUP_JOB_ID)?;
    cleanup_pass(state, now).await
}

/// Take a manual backup unless another manual backup is running.
///
/// # Errors
/// Returns [`AppError::Conflict`] while busy, or [`AppError::Backup`] when
/// every attempt failed.
pub async fn run_manual_backup(state: &AppState) -> Result<ProducedSnapshot, AppError> {
    let _guard = claim(state, MANUAL_BACKUP_JOB_ID)?;
    Ok(state.producer.produce_snapshot(BackupKind::Manual).await?)
}

/// Startup or shutdown snapshot, honouring the enable flags.
///
/// Returns the produced snapshot, or `None` when disabled or failed.
pub async fn lifecycle_backup(state: &AppState, kind: BackupKind) -> Option<ProducedSnapshot> {
    let backup = &state.config.backup;
    let wanted = match kind {
        BackupKind::Startup => backup.on_startup,
        BackupKind::Shutdown => backup.on_shutdown,
        BackupKind::Scheduled | BackupKind::Manual => true,
    };
    if !backup.enabled || !wanted {
        return None;
    }
    tracing::info!("Creating {} backup...", kind);
    state.producer.produce_snapshot(kind).await.ok()
}
