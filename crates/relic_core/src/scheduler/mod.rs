//! In-process job scheduler with an explicit start/shutdown lifecycle.
//!
//! Each job gets its own loop task. The loop sleeps until the trigger fires,
//! claims the job's guard in the shared [`JobRegistry`], and runs the action
//! inline. A firing that finds the guard taken is skipped, not queued.

/// Single-flight guards keyed by job id.
pub mod registry;
/// Daily and interval firing rules.
pub mod trigger;

pub use registry::{JobGuard, JobRegistry, JobRegistryError};
pub use trigger::Trigger;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type JobAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A named, triggered unit of background work.
#[derive(Clone)]
pub struct Job {
    id: String,
    trigger: Trigger,
    action: JobAction,
}

impl Job {
    pub fn new<F, Fut>(id: impl Into<String>, trigger: Trigger, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: id.into(),
            trigger,
            action: Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

struct RunningJob {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns job definitions and, once started, their loop tasks.
pub struct Scheduler {
    timezone: Tz,
    registry: JobRegistry,
    jobs: Vec<Job>,
    running: Vec<(String, RunningJob)>,
    retired: Vec<JoinHandle<()>>,
    started: bool,
}

impl Scheduler {
    pub fn new(timezone: Tz) -> Self {
        Self::with_registry(timezone, JobRegistry::new())
    }

    /// Scheduler that guards runs through an existing registry.
    pub fn with_registry(timezone: Tz, registry: JobRegistry) -> Self {
        Self {
            timezone,
            registry,
            jobs: Vec::new(),
            running: Vec::new(),
            retired: Vec::new(),
            started: false,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Job ids in registration order.
    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(Job::id).collect()
    }

    /// Next firing time of every job as seen from `now`.
    pub fn next_runs(&self, now: DateTime<Utc>) -> Vec<(String, DateTime<Utc>)> {
        self.jobs
            .iter()
            .map(|job| (job.id.clone(), job.trigger.next_fire_after(now, self.timezone)))
            .collect()
    }

    /// Register `job`, replacing any job with the same id.
    ///
    /// On a started scheduler the replaced loop is told to stop (it finishes
    /// any in-flight run first) and the new loop starts immediately.
    pub fn add_job(&mut self, job: Job) {
        if let Some(existing) = self.jobs.iter_mut().find(|j| j.id == job.id) {
            tracing::debug!("Replacing scheduled job {}", job.id);
            *existing = job.clone();
        } else {
            self.jobs.push(job.clone());
        }

        if self.started {
            if let Some(index) = self.running.iter().position(|(id, _)| *id == job.id) {
                let (_, old) = self.running.swap_remove(index);
                let _ = old.stop.send(true);
                self.retired.push(old.handle);
            }
            let running = self.spawn(job.clone());
            self.running.push((job.id, running));
        }
    }

    /// Spawn a loop task for every registered job. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            tracing::warn!("Scheduler already started");
            return;
        }
        self.started = true;
        let jobs = self.jobs.clone();
        for job in jobs {
            tracing::info!(
                "Scheduled job {} ({}, {})",
                job.id,
                job.trigger,
                self.timezone
            );
            let running = self.spawn(job.clone());
            self.running.push((job.id, running));
        }
        tracing::info!("Scheduler started with {} jobs", self.running.len());
    }

    /// Stop all triggers and wait for in-flight runs to finish.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        for (_, running) in &self.running {
            let _ = running.stop.send(true);
        }
        let handles = self
            .running
            .drain(..)
            .map(|(_, running)| running.handle)
            .chain(self.retired.drain(..));
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!("Scheduled job task failed: {}", err);
            }
        }
        tracing::info!("Scheduler stopped");
    }

    fn spawn(&self, job: Job) -> RunningJob {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_job_loop(
            job,
            self.timezone,
            self.registry.clone(),
            stop_rx,
        ));
        RunningJob { stop, handle }
    }
}

/// Next wall-clock firing and the monotonic instant to sleep until.
///
/// The next firing is always computed from the previous target, never from a
/// clock reading taken before it, so a sleep that wakes slightly early cannot
/// fire the same daily slot twice.
fn advance(
    trigger: &Trigger,
    timezone: Tz,
    target: DateTime<Utc>,
    deadline: Instant,
    wall_now: DateTime<Utc>,
    instant_now: Instant,
) -> (DateTime<Utc>, Instant) {
    if wall_now <= target {
        let next = trigger.next_fire_after(target, timezone);
        let gap = (next - target).to_std().unwrap_or(Duration::ZERO);
        (next, deadline + gap)
    } else {
        let next = trigger.next_fire_after(wall_now, timezone);
        (next, instant_now + trigger.delay_from(wall_now, timezone))
    }
}

async fn run_job_loop(job: Job, timezone: Tz, registry: JobRegistry, mut stop: watch::Receiver<bool>) {
    let now = Utc::now();
    let mut target = job.trigger.next_fire_after(now, timezone);
    let mut deadline = Instant::now() + job.trigger.delay_from(now, timezone);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = stop.changed() => break,
        }
        if *stop.borrow() {
            break;
        }

        match registry.try_acquire(&job.id) {
            Ok(_guard) => {
                tracing::debug!("Running scheduled job {}", job.id);
                (job.action)().await;
            }
            Err(err) => tracing::warn!("Skipping scheduled run of {}: {}", job.id, err),
        }

        (target, deadline) = advance(
            &job.trigger,
            timezone,
            target,
            deadline,
            Utc::now(),
            Instant::now(),
        );
    }
    tracing::debug!("Job loop for {} stopped", job.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn counting_job(id: &str, period: Duration, counter: Arc<AtomicU32>) -> Job {
        Job::new(id, Trigger::Interval(period), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn interval_job_runs_until_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Tz::UTC);
        scheduler.add_job(counting_job("tick", Duration::from_secs(60), counter.clone()));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(60 * 3 + 30)).await;
        scheduler.shutdown().await;
        let runs = counter.load(Ordering::SeqCst);
        assert_eq!(runs, 3);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(counter.load(Ordering::SeqCst), runs);
        assert!(!scheduler.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn add_job_replaces_by_id() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Tz::UTC);
        scheduler.add_job(counting_job("tick", Duration::from_secs(10), first.clone()));
        scheduler.add_job(counting_job("tick", Duration::from_secs(10), second.clone()));
        assert_eq!(scheduler.job_ids(), vec!["tick"]);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.shutdown().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_started_job_stops_the_old_loop() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Tz::UTC);
        scheduler.add_job(counting_job("tick", Duration::from_secs(10), first.clone()));
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(15)).await;

        scheduler.add_job(counting_job("tick", Duration::from_secs(10), second.clone()));
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.shutdown().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn firing_while_guard_is_held_is_skipped() {
        let counter = Arc::new(AtomicU32::new(0));
        let registry = JobRegistry::new();
        let mut scheduler = Scheduler::with_registry(Tz::UTC, registry.clone());
        scheduler.add_job(counting_job("backup_cleanup", Duration::from_secs(10), counter.clone()));

        let manual_run = registry.try_acquire("backup_cleanup").expect("manual guard");
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        drop(manual_run);
        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_runs() {
        let started = Arc::new(Notify::new());
        let finished = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Tz::UTC);
        {
            let started = started.clone();
            let finished = finished.clone();
            scheduler.add_job(Job::new(
                "slow",
                Trigger::Interval(Duration::from_secs(5)),
                move || {
                    let started = started.clone();
                    let finished = finished.clone();
                    async move {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ));
        }
        scheduler.start();
        started.notified().await;

        scheduler.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn early_wakeup_does_not_refire_the_same_daily_slot() {
        let trigger = Trigger::Daily { hour: 2, minute: 0 };
        let target = crate::test_support::utc(2024, 1, 2, 2, 0, 0);
        let tomorrow = crate::test_support::utc(2024, 1, 3, 2, 0, 0);
        let deadline = Instant::now();

        let early = target - chrono::Duration::milliseconds(5);
        let (next, next_deadline) = advance(&trigger, Tz::UTC, target, deadline, early, deadline);
        assert_eq!(next, tomorrow);
        assert_eq!(next_deadline, deadline + Duration::from_secs(24 * 60 * 60));

        let late = target + chrono::Duration::seconds(90);
        let (next, next_deadline) = advance(&trigger, Tz::UTC, target, deadline, late, deadline);
        assert_eq!(next, tomorrow);
        assert_eq!(
            next_deadline,
            deadline + Duration::from_secs(24 * 60 * 60 - 90)
        );
    }

    #[test]
    fn next_runs_reports_each_job() {
        let mut scheduler = Scheduler::new(Tz::UTC);
        scheduler.add_job(Job::new(
            "backup_0200",
            Trigger::Daily { hour: 2, minute: 0 },
            || async {},
        ));
        let now = crate::test_support::utc(2024, 1, 1, 12, 0, 0);
        assert_eq!(
            scheduler.next_runs(now),
            vec![(
                "backup_0200".to_string(),
                crate::test_support::utc(2024, 1, 2, 2, 0, 0)
            )]
        );
    }
}
