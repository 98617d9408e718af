//! Timing windows that drive the ledger's activity, compaction and retention rules.

use chrono::{DateTime, Duration, Utc};

/// Entities not observed for longer than this are marked inactive.
pub const DEFAULT_ACTIVITY_WINDOW_HOURS: i64 = 48;
/// Raw points older than this are folded into daily averages.
pub const DEFAULT_COMPACTION_AGE_HOURS: i64 = 48;
/// Data older than this is discarded outright.
pub const DEFAULT_RETENTION_DAYS: i64 = 10;

/// Windows applied on every ledger update, all measured back from `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub activity_window: Duration,
    pub compaction_age: Duration,
    pub retention: Duration,
    /// Drop records whose series are both empty after the update.
    pub prune_empty_records: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            activity_window: Duration::hours(DEFAULT_ACTIVITY_WINDOW_HOURS),
            compaction_age: Duration::hours(DEFAULT_COMPACTION_AGE_HOURS),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            prune_empty_records: false,
        }
    }
}

impl RetentionPolicy {
    /// Points strictly before this instant are compacted.
    pub fn compaction_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.compaction_age)
    }

    /// Points at or before this instant are discarded.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.retention)
    }
}

/// `now - window`, saturating at the earliest representable instant.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
