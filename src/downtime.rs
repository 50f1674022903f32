use chrono::{DateTime, Local, TimeDelta, Utc};
use tokio::time::Instant;

use crate::models::{Classification, DowntimeInterval, LinkState};

/// Two-state Up/Down machine accumulating closed downtime.
#[derive(Debug, Clone)]
pub struct DowntimeTracker {
    down_since: Option<DateTime<Utc>>,
    total: TimeDelta,
    intervals: Vec<DowntimeInterval>,
}

impl Default for DowntimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DowntimeTracker {
    pub fn new() -> Self {
        Self {
            down_since: None,
            total: TimeDelta::zero(),
            intervals: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        if self.down_since.is_some() { LinkState::Down } else { LinkState::Up }
    }

    pub fn down_since(&self) -> Option<DateTime<Utc>> {
        self.down_since
    }

    /// Feeds one classification. Returns the interval closed by a Down -> Up
    /// transition, if any. `InternalError` leaves the state untouched.
    pub fn observe(&mut self, classification: Classification, now: DateTime<Utc>) -> Option<DowntimeInterval> {
        let next = classification.link_state()?;
        match (self.down_since, next) {
            (None, LinkState::Down) => {
                self.down_since = Some(now);
                None
            }
            (Some(since), LinkState::Up) => {
                let interval = DowntimeInterval::closed(since, now);
                self.total += interval.duration();
                self.down_since = None;
                self.intervals.push(interval.clone());
                Some(interval)
            }
            _ => None,
        }
    }

    /// Downtime closed so far. Only grows on Down -> Up.
    pub fn total(&self) -> TimeDelta {
        self.total
    }

    /// Reporting view: includes the open interval without storing it.
    pub fn total_at(&self, now: DateTime<Utc>) -> TimeDelta {
        match self.down_since {
            Some(since) if now > since => self.total + (now - since),
            _ => self.total,
        }
    }

    pub fn intervals(&self) -> &[DowntimeInterval] {
        &self.intervals
    }
}

/// Per-process state carried across cycles. Owned by the loop driver only.
#[derive(Debug)]
pub struct Session {
    started: Instant,
    started_at: DateTime<Local>,
    pub tracker: DowntimeTracker,
}

impl Session {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Local::now(),
            tracker: DowntimeTracker::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
