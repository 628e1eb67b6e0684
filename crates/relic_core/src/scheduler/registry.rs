//! Single-flight guards for named jobs.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry runtime errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRegistryError {
    /// Another run of the job still holds its guard.
    Busy { job_id: String },
    /// Internal mutex state is poisoned.
    Poisoned,
}

impl fmt::Display for JobRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { job_id } => write!(f, "job '{job_id}' is already running"),
            Self::Poisoned => write!(f, "job registry state is poisoned"),
        }
    }
}

impl std::error::Error for JobRegistryError {}

/// Tracks which named jobs are running right now.
///
/// Cloning shares the same state, so the scheduler and the admin API can
/// guard the same job names.
#[derive(Clone, Default)]
pub struct JobRegistry {
    running: Arc<Mutex<HashSet<String>>>,
}

/// Marks a job as running until dropped.
pub struct JobGuard {
    registry: JobRegistry,
    job_id: String,
}

impl JobGuard {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl fmt::Debug for JobGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobGuard")
            .field("job_id", &self.job_id)
            .finish()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        match self.registry.running.lock() {
            Ok(mut running) => {
                running.remove(&self.job_id);
            }
            Err(_) => {
                tracing::error!(
                    "Failed to release job guard for '{}': registry poisoned",
                    self.job_id
                );
            }
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, HashSet<String>>, JobRegistryError> {
        self.running.lock().map_err(|_| JobRegistryError::Poisoned)
    }

    /// Claim `job_id` for one run.
    ///
    /// # Errors
    /// Returns [`JobRegistryError::Busy`] when a guard for `job_id` is still
    /// alive, or [`JobRegistryError::Poisoned`] when state is poisoned.
    pub fn try_acquire(&self, job_id: &str) -> Result<JobGuard, JobRegistryError> {
        let mut running = self.state()?;
        if !running.insert(job_id.to_string()) {
            return Err(JobRegistryError::Busy {
                job_id: job_id.to_string(),
            });
        }
        Ok(JobGuard {
            registry: self.clone(),
            job_id: job_id.to_string(),
        })
    }

    pub fn is_running(&self, job_id: &str) -> Result<bool, JobRegistryError> {
        Ok(self.state()?.contains(job_id))
    }

    /// Names of jobs currently holding a guard, sorted.
    pub fn running_jobs(&self) -> Result<Vec<String>, JobRegistryError> {
        let mut jobs: Vec<String> = self.state()?.iter().cloned().collect();
        jobs.sort();
        Ok(jobs)
    }
}
