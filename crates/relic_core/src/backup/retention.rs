//! Tiered backup retention.
//!
//! Snapshots are walked newest first. Each calendar month and each ISO week
//! is marked filled the first time it is seen, so the newest snapshot of a
//! period is the one retained for it. Reordering the walk changes which
//! snapshot survives, so [`classify`] always sorts before walking.

use super::Snapshot;
use crate::constants::{DEFAULT_RETENTION_DAYS, DEFAULT_RETENTION_WEEKS_DAYS};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Why a snapshot was kept, or that it was not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    Monthly,
    Weekly,
    Daily,
    Expired,
}

impl RetentionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RetentionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Retention windows, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Every snapshot at most this many days old is kept.
    pub retention_days: i64,
    /// One snapshot per ISO week at most this many days old is kept.
    pub retention_weeks_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            retention_weeks_days: DEFAULT_RETENTION_WEEKS_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Report settings that classify deterministically but probably do not
    /// do what the operator intended.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.retention_days < 0 {
            warnings.push(format!(
                "retention_days is negative ({}); no snapshot qualifies for the daily tier",
                self.retention_days
            ));
        }
        if self.retention_weeks_days < self.retention_days {
            warnings.push(format!(
                "retention_weeks_days ({}) is shorter than retention_days ({}); \
                 the weekly tier only applies inside the daily window",
                self.retention_weeks_days, self.retention_days
            ));
        }
        warnings
    }
}

/// A snapshot selected for retention, with the tier that justified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedSnapshot {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub tier: RetentionTier,
}

/// Keep/delete partition produced by one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Retained snapshots, newest first.
    pub keep: Vec<RetainedSnapshot>,
    /// Expired snapshots, newest first.
    pub delete: Vec<Snapshot>,
}

/// Number of retained snapshots per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub monthly: usize,
    pub weekly: usize,
    pub daily: usize,
}

impl Classification {
    pub fn tier_counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for retained in &self.keep {
            match retained.tier {
                RetentionTier::Monthly => counts.monthly += 1,
                RetentionTier::Weekly => counts.weekly += 1,
                RetentionTier::Daily => counts.daily += 1,
                RetentionTier::Expired => {}
            }
        }
        counts
    }

    /// Tier assigned to `key` in this pass, `Expired` for deleted keys.
    pub fn tier_of(&self, key: &str) -> Option<RetentionTier> {
        if let Some(retained) = self.keep.iter().find(|r| r.snapshot.key == key) {
            return Some(retained.tier);
        }
        self.delete
            .iter()
            .any(|s| s.key == key)
            .then_some(RetentionTier::Expired)
    }

    /// Total number of snapshots that went into the pass.
    pub fn len(&self) -> usize {
        self.keep.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keep.is_empty() && self.delete.is_empty()
    }
}

/// Newest first; equal timestamps fall back to key order so the walk does not
/// depend on the order the store listed objects in.
pub fn newest_first(a: &Snapshot, b: &Snapshot) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.key.cmp(&b.key))
}

/// Whole calendar days between the snapshot's UTC date and `now`'s UTC date.
fn age_days(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> i64 {
    (now.date_naive() - timestamp.date_naive()).num_days()
}

/// Partition snapshots into keep (tagged with a tier) and delete.
///
/// Tier rules, first match wins:
/// 1. monthly: first snapshot seen for its `(year, month)`, at any age
/// 2. weekly: age within `retention_weeks_days` and first snapshot seen for
///    its ISO `(year, week)`
/// 3. daily: age within `retention_days`
/// 4. expired otherwise
///
/// Pure and deterministic for a given input set and `now`.
pub fn classify(
    snapshots: Vec<Snapshot>,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Classification {
    let mut sorted = snapshots;
    sorted.sort_by(newest_first);

    let mut seen_months: HashSet<(i32, u32)> = HashSet::new();
    let mut seen_weeks: HashSet<(i32, u32)> = HashSet::new();
    let mut classification = Classification::default();

    for snapshot in sorted {
        let age = age_days(now, snapshot.timestamp);
        let month = (snapshot.timestamp.year(), snapshot.timestamp.month());
        let iso = snapshot.timestamp.iso_week();
        let week = (iso.year(), iso.week());

        let tier = if seen_months.insert(month) {
            RetentionTier::Monthly
        } else if age <= policy.retention_weeks_days && seen_weeks.insert(week) {
            RetentionTier::Weekly
        } else if age <= policy.retention_days {
            RetentionTier::Daily
        } else {
            RetentionTier::Expired
        };

        if tier == RetentionTier::Expired {
            classification.delete.push(snapshot);
        } else {
            classification.keep.push(RetainedSnapshot { snapshot, tier });
        }
    }

    let counts = classification.tier_counts();
    tracing::debug!(
        "Retention classification: {} to keep ({} daily, {} weekly, {} monthly), {} to delete",
        classification.keep.len(),
        counts.daily,
        counts.weekly,
        counts.monthly,
        classification.delete.len()
    );

    classification
}
