//! When a job fires.

use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::time::Duration;

/// Firing rule for a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every day at `hour:minute` wall-clock time in the scheduler timezone.
    Daily { hour: u32, minute: u32 },
    /// Fixed period measured from the end of the previous wait.
    Interval(Duration),
}

impl Trigger {
    /// Daily trigger, or `None` for an out-of-range time of day.
    pub fn daily(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self::Daily { hour, minute })
    }

    /// First instant strictly after `now` at which this trigger fires.
    ///
    /// Daily times that fall into a DST gap fire at the first valid local
    /// time after the gap; times repeated by a DST fold fire on the earlier
    /// occurrence.
    pub fn next_fire_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match *self {
            Self::Interval(period) => {
                let step = ChronoDuration::from_std(period)
                    .unwrap_or_else(|_| ChronoDuration::days(365));
                now.checked_add_signed(step)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            Self::Daily { hour, minute } => {
                let today = now.with_timezone(&tz).date_naive();
                for offset in 0..=2 {
                    let Some(date) = today.checked_add_signed(ChronoDuration::days(offset)) else {
                        break;
                    };
                    let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                        break;
                    };
                    if let Some(candidate) = resolve_local(tz, naive) {
                        if candidate > now {
                            return candidate;
                        }
                    }
                }
                now + ChronoDuration::days(1)
            }
        }
    }

    /// Time to wait from `now` until the next firing.
    pub fn delay_from(&self, now: DateTime<Utc>, tz: Tz) -> Duration {
        (self.next_fire_after(now, tz) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    // Gaps are at most a couple of hours in practice.
    for shift in 0..=3 {
        let shifted = naive + ChronoDuration::hours(shift);
        match tz.from_local_datetime(&shifted) {
            LocalResult::Single(local) => return Some(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    None
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily { hour, minute } => write!(f, "daily at {:02}:{:02}", hour, minute),
            Self::Interval(period) => write!(f, "every {:?}", period),
        }
    }
}
