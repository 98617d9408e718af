//! Historical ledger: per-entity tracking records and the update cycle.
//!
//! One update folds a batch of observations into the ledger and then runs the
//! maintenance passes over every record, observed or not:
//!
//! 1. ingest: create or refresh records, append one hourly point each
//! 2. activity sweep: `is_active` iff `last_seen` is within the activity window
//! 3. retention trim: drop hourly points at or before the retention cutoff and
//!    daily averages dated before it
//! 4. compaction: once a record is older than the compaction age, fold hourly
//!    points before the boundary into per-day averages (UTC days)
//!
//! Records live in a `BTreeMap`, so iteration is ascending by entity id.

pub mod policy;
pub mod projection;

pub use policy::{
    RetentionPolicy, DEFAULT_ACTIVITY_WINDOW_HOURS, DEFAULT_COMPACTION_AGE_HOURS,
    DEFAULT_RETENTION_DAYS,
};
pub use projection::{latest_value, project, LatestValue, TrackedEntity, ValueKind};

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DailyAverage, EntityId, EntityRecord, HourlyPoint, Observation};

/// The persisted aggregate: every tracked entity's record, keyed by id.
///
/// Serializes as `{"cryptos": {<id>: EntityRecord, ...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(rename = "cryptos", default)]
    records: BTreeMap<EntityId, EntityRecord>,
}

/// What one update did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub points_trimmed: usize,
    pub averages_trimmed: usize,
    pub points_compacted: usize,
    pub pruned: usize,
}

/// Aggregate counts over the whole ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub entities: usize,
    pub active: usize,
    pub hourly_points: usize,
    pub daily_averages: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: BTreeMap<EntityId, EntityRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    pub fn insert(&mut self, id: impl Into<EntityId>, record: EntityRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn records(&self) -> &BTreeMap<EntityId, EntityRecord> {
        &self.records
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> LedgerStats {
        self.records.values().fold(
            LedgerStats {
                entities: self.records.len(),
                ..LedgerStats::default()
            },
            |mut acc, r| {
                acc.active += usize::from(r.is_active);
                acc.hourly_points += r.hourly_points.len();
                acc.daily_averages += r.daily_averages.len();
                acc
            },
        )
    }

    /// Fold one batch of observations taken at `now` into the ledger.
    ///
    /// Observations are deduplicated by id; the last occurrence wins.
    pub fn update(
        &mut self,
        observations: &[Observation],
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();

        let mut latest: BTreeMap<&str, &Observation> = BTreeMap::new();
        for obs in observations {
            latest.insert(obs.id.as_str(), obs);
        }
        for obs in latest.into_values() {
            if self.ingest(obs, now) {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }

        for record in self.records.values_mut() {
            if refresh_activity(record, now, policy) {
                summary.deactivated += 1;
            }
            let (points, averages) = trim_retention(record, now, policy);
            summary.points_trimmed += points;
            summary.averages_trimmed += averages;
            summary.points_compacted += compact(record, now, policy);
        }

        if policy.prune_empty_records {
            let before = self.records.len();
            self.records.retain(|_, r| !r.is_empty());
            summary.pruned = before - self.records.len();
        }

        tracing::debug!(?summary, entities = self.records.len(), "ledger updated");
        summary
    }

    /// Returns true if a new record was created.
    fn ingest(&mut self, obs: &Observation, now: DateTime<Utc>) -> bool {
        let mut created = false;
        let record = self.records.entry(obs.id.clone()).or_insert_with(|| {
            created = true;
            EntityRecord::new(obs.info.clone(), now)
        });

        record.info = obs.info.clone();
        record.first_seen = record.first_seen.min(now);
        record.last_seen = now;
        record.is_active = true;
        record.hourly_points.push(HourlyPoint {
            timestamp: now,
            price: obs.price,
            percent_change: obs.percent_change,
            rank: obs.rank,
        });
        created
    }
}

/// Recompute `is_active`. Returns true if the record just went inactive.
fn refresh_activity(record: &mut EntityRecord, now: DateTime<Utc>, policy: &RetentionPolicy) -> bool {
    let was_active = record.is_active;
    record.is_active = now - record.last_seen <= policy.activity_window;
    was_active && !record.is_active
}

/// Returns (hourly points dropped, daily averages dropped).
fn trim_retention(
    record: &mut EntityRecord,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> (usize, usize) {
    let cutoff = policy.retention_cutoff(now);
    let cutoff_day = cutoff.date_naive();

    let points_before = record.hourly_points.len();
    record.hourly_points.retain(|p| p.timestamp > cutoff);

    let averages_before = record.daily_averages.len();
    record.daily_averages.retain(|d| d.date >= cutoff_day);

    (
        points_before - record.hourly_points.len(),
        averages_before - record.daily_averages.len(),
    )
}

/// Running sums for one calendar day.
#[derive(Debug, Default)]
struct DayBucket {
    price_sum: f64,
    change_sum: f64,
    count: usize,
}

impl DayBucket {
    fn push(&mut self, point: &HourlyPoint) {
        self.price_sum += point.price;
        self.change_sum += point.percent_change;
        self.count += 1;
    }

    fn absorb(&mut self, prior: &DailyAverage) {
        let n = prior.sample_count as f64;
        self.price_sum += prior.avg_price * n;
        self.change_sum += prior.avg_percent_change * n;
        self.count += prior.sample_count;
    }

    fn finish(self, date: NaiveDate) -> Option<DailyAverage> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(DailyAverage {
            date,
            avg_price: self.price_sum / n,
            avg_percent_change: self.change_sum / n,
            sample_count: self.count,
        })
    }
}

/// Fold points before the compaction boundary into daily averages.
///
/// A day that already has an average is combined sample-weighted, so each
/// entry stays the exact mean of every sample of that day compacted so far.
/// Returns the number of hourly points consumed.
fn compact(record: &mut EntityRecord, now: DateTime<Utc>, policy: &RetentionPolicy) -> usize {
    if now - record.first_seen <= policy.compaction_age {
        return 0;
    }

    let boundary = policy.compaction_boundary(now);
    let (aged, recent): (Vec<HourlyPoint>, Vec<HourlyPoint>) =
        std::mem::take(&mut record.hourly_points)
            .into_iter()
            .partition(|p| p.timestamp < boundary);
    record.hourly_points = recent;

    if aged.is_empty() {
        return 0;
    }

    let mut buckets: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
    for point in &aged {
        buckets
            .entry(point.timestamp.date_naive())
            .or_default()
            .push(point);
    }

    let mut days: BTreeMap<NaiveDate, DailyAverage> = std::mem::take(&mut record.daily_averages)
        .into_iter()
        .map(|d| (d.date, d))
        .collect();

    for (date, mut bucket) in buckets {
        if let Some(prior) = days.remove(&date) {
            bucket.absorb(&prior);
        }
        if let Some(avg) = bucket.finish(date) {
            days.insert(date, avg);
        }
    }

    record.daily_averages = days.into_values().collect();
    aged.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityInfo;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn obs(id: &str, price: f64, change: f64) -> Observation {
        Observation {
            id: id.to_string(),
            info: EntityInfo {
                symbol: id.to_uppercase(),
                name: id.to_string(),
                image: format!("https://img/{id}.png"),
            },
            price,
            percent_change: change,
            rank: Some(7),
        }
    }

    fn point(ts: DateTime<Utc>, price: f64, change: f64) -> HourlyPoint {
        HourlyPoint {
            timestamp: ts,
            price,
            percent_change: change,
            rank: None,
        }
    }

    #[test]
    fn ingest_creates_record() {
        let mut ledger = Ledger::new();
        let summary = ledger.update(&[obs("btc", 100.0, 1.5)], t0(), &RetentionPolicy::default());

        assert_eq!(summary.created, 1);
        let rec = ledger.get("btc").unwrap();
        assert_eq!(rec.first_seen, t0());
        assert_eq!(rec.last_seen, t0());
        assert!(rec.is_active);
        assert_eq!(
            rec.hourly_points,
            vec![HourlyPoint {
                timestamp: t0(),
                price: 100.0,
                percent_change: 1.5,
                rank: Some(7),
            }]
        );
        assert!(rec.daily_averages.is_empty());
    }

    #[test]
    fn info_is_last_write_wins() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        ledger.update(&[obs("btc", 100.0, 1.0)], t0(), &policy);

        let mut renamed = obs("btc", 101.0, 2.0);
        renamed.info.name = "Bitcoin (renamed)".into();
        let summary = ledger.update(&[renamed], t0() + Duration::hours(1), &policy);

        assert_eq!(summary.updated, 1);
        let rec = ledger.get("btc").unwrap();
        assert_eq!(rec.info.name, "Bitcoin (renamed)");
        assert_eq!(rec.first_seen, t0());
        assert_eq!(rec.last_seen, t0() + Duration::hours(1));
        assert_eq!(rec.hourly_points.len(), 2);
    }

    #[test]
    fn duplicate_ids_keep_last_occurrence() {
        let mut ledger = Ledger::new();
        ledger.update(
            &[obs("btc", 1.0, 5.0), obs("btc", 2.0, -5.0)],
            t0(),
            &RetentionPolicy::default(),
        );
        let rec = ledger.get("btc").unwrap();
        assert_eq!(rec.hourly_points.len(), 1);
        assert_eq!(rec.hourly_points[0].price, 2.0);
        assert_eq!(rec.hourly_points[0].percent_change, -5.0);
    }

    #[test]
    fn unobserved_entity_goes_inactive() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        ledger.update(&[obs("old", 1.0, 1.0)], t0(), &policy);

        // Exactly at the window edge it is still active.
        ledger.update(&[obs("other", 1.0, 1.0)], t0() + Duration::days(2), &policy);
        assert!(ledger.get("old").unwrap().is_active);

        let summary = ledger.update(
            &[obs("other", 1.0, 1.0)],
            t0() + Duration::days(2) + Duration::minutes(1),
            &policy,
        );
        assert_eq!(summary.deactivated, 1);
        assert!(!ledger.get("old").unwrap().is_active);
        assert!(ledger.get("other").unwrap().is_active);
    }

    #[test]
    fn reobserved_entity_reactivates() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        ledger.update(&[obs("x", 1.0, 1.0)], t0(), &policy);
        ledger.update(&[], t0() + Duration::days(3), &policy);
        assert!(!ledger.get("x").unwrap().is_active);

        ledger.update(&[obs("x", 1.0, 1.0)], t0() + Duration::days(4), &policy);
        assert!(ledger.get("x").unwrap().is_active);
    }

    #[test]
    fn retention_drops_points_at_cutoff() {
        let policy = RetentionPolicy::default();
        let now = t0() + Duration::days(10);
        let mut record = EntityRecord::new(obs("x", 1.0, 1.0).info, now);
        record.hourly_points = vec![
            point(t0(), 1.0, 0.0),
            point(t0() + Duration::seconds(1), 2.0, 0.0),
        ];

        let (dropped, _) = trim_retention(&mut record, now, &policy);
        assert_eq!(dropped, 1);
        assert_eq!(record.hourly_points.len(), 1);
        assert_eq!(record.hourly_points[0].price, 2.0);
    }

    #[test]
    fn retention_drops_old_daily_averages() {
        let policy = RetentionPolicy::default();
        let now = t0() + Duration::days(12);
        let mut record = EntityRecord::new(obs("x", 1.0, 1.0).info, t0());
        let day = |d: i64| (t0() + Duration::days(d)).date_naive();
        record.daily_averages = [0, 1, 2, 3]
            .iter()
            .map(|&d| DailyAverage {
                date: day(d),
                avg_price: 1.0,
                avg_percent_change: 0.0,
                sample_count: 1,
            })
            .collect();

        let (_, dropped) = trim_retention(&mut record, now, &policy);
        // Cutoff is day 2 at noon; day 2 itself is kept.
        assert_eq!(dropped, 2);
        let kept: Vec<_> = record.daily_averages.iter().map(|d| d.date).collect();
        assert_eq!(kept, vec![day(2), day(3)]);
    }

    #[test]
    fn young_records_are_not_compacted() {
        let policy = RetentionPolicy::default();
        let mut record = EntityRecord::new(obs("x", 1.0, 1.0).info, t0());
        record.hourly_points = vec![point(t0(), 1.0, 0.0)];

        let consumed = compact(&mut record, t0() + Duration::days(2), &policy);
        assert_eq!(consumed, 0);
        assert_eq!(record.hourly_points.len(), 1);
        assert!(record.daily_averages.is_empty());
    }

    #[test]
    fn compaction_averages_per_utc_day() {
        let policy = RetentionPolicy::default();
        let day0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut record = EntityRecord::new(obs("x", 1.0, 1.0).info, day0);
        record.hourly_points = vec![
            point(day0 + Duration::hours(1), 10.0, 1.0),
            point(day0 + Duration::hours(23), 20.0, 3.0),
            point(day0 + Duration::hours(25), 30.0, -2.0),
            point(day0 + Duration::hours(80), 99.0, 9.0),
        ];

        let now = day0 + Duration::hours(100);
        let consumed = compact(&mut record, now, &policy);

        assert_eq!(consumed, 3);
        assert_eq!(record.hourly_points.len(), 1);
        assert_eq!(record.hourly_points[0].price, 99.0);
        assert_eq!(record.daily_averages.len(), 2);

        let d0 = &record.daily_averages[0];
        assert_eq!(d0.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!((d0.avg_price - 15.0).abs() < 1e-9);
        assert!((d0.avg_percent_change - 2.0).abs() < 1e-9);
        assert_eq!(d0.sample_count, 2);

        let d1 = &record.daily_averages[1];
        assert_eq!(d1.date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(d1.sample_count, 1);
        assert!((d1.avg_price - 30.0).abs() < 1e-9);
    }

    #[test]
    fn compaction_merges_into_existing_day() {
        let policy = RetentionPolicy::default();
        let day0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut record = EntityRecord::new(obs("x", 1.0, 1.0).info, day0);
        record.hourly_points = vec![
            point(day0 + Duration::hours(2), 10.0, 1.0),
            point(day0 + Duration::hours(20), 40.0, 4.0),
        ];

        // First pass only reaches the 02:00 point.
        compact(&mut record, day0 + Duration::hours(51), &policy);
        assert_eq!(record.daily_averages[0].sample_count, 1);
        assert_eq!(record.hourly_points.len(), 1);

        // Second pass folds the 20:00 point into the same day.
        compact(&mut record, day0 + Duration::hours(70), &policy);
        assert_eq!(record.hourly_points.len(), 0);
        assert_eq!(record.daily_averages.len(), 1);
        let d0 = &record.daily_averages[0];
        assert_eq!(d0.sample_count, 2);
        assert!((d0.avg_price - 25.0).abs() < 1e-9);
        assert!((d0.avg_percent_change - 2.5).abs() < 1e-9);
    }

    #[test]
    fn zero_sample_bucket_is_skipped() {
        assert!(DayBucket::default()
            .finish(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .is_none());
    }

    #[test]
    fn repeated_update_at_same_instant_only_appends() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        for d in 0..=4 {
            ledger.update(&[obs("x", 10.0 + d as f64, 1.0)], t0() + Duration::days(d), &policy);
        }
        let now = t0() + Duration::days(4);
        let before = ledger.get("x").unwrap().clone();

        ledger.update(&[obs("x", 50.0, 1.0)], now, &policy);
        let after = ledger.get("x").unwrap();

        assert_eq!(after.hourly_points.len(), before.hourly_points.len() + 1);
        assert_eq!(after.daily_averages, before.daily_averages);
    }

    #[test]
    fn empty_records_are_kept_by_default() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        ledger.update(&[obs("gone", 1.0, 1.0)], t0(), &policy);
        ledger.update(&[], t0() + Duration::days(30), &policy);

        let rec = ledger.get("gone").unwrap();
        assert!(rec.is_empty());
        assert!(!rec.is_active);
        assert_eq!(rec.first_seen, t0());
    }

    #[test]
    fn empty_records_pruned_when_enabled() {
        let policy = RetentionPolicy {
            prune_empty_records: true,
            ..RetentionPolicy::default()
        };
        let mut ledger = Ledger::new();
        ledger.update(&[obs("gone", 1.0, 1.0)], t0(), &policy);
        let summary = ledger.update(&[obs("fresh", 1.0, 1.0)], t0() + Duration::days(30), &policy);

        assert_eq!(summary.pruned, 1);
        assert!(ledger.get("gone").is_none());
        assert!(ledger.get("fresh").is_some());
    }

    #[test]
    fn oversized_retention_keeps_everything() {
        let policy = RetentionPolicy {
            retention: Duration::days(100_000_000),
            ..RetentionPolicy::default()
        };
        let mut ledger = Ledger::new();
        ledger.update(&[obs("x", 1.0, 1.0)], t0(), &policy);
        let summary = ledger.update(&[obs("x", 2.0, 1.0)], t0() + Duration::days(30), &policy);

        assert_eq!(summary.points_trimmed, 0);
        assert_eq!(summary.averages_trimmed, 0);
        let rec = ledger.get("x").unwrap();
        assert_eq!(rec.daily_averages.len(), 1);
        assert_eq!(rec.hourly_points.len(), 1);
    }

    #[test]
    fn stats_count_series_and_activity() {
        let policy = RetentionPolicy::default();
        let mut ledger = Ledger::new();
        ledger.update(&[obs("a", 1.0, 1.0), obs("b", 1.0, 1.0)], t0(), &policy);
        ledger.update(&[obs("a", 1.0, 1.0)], t0() + Duration::days(3), &policy);

        let stats = ledger.stats();
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.hourly_points + stats.daily_averages, 3);
    }

    #[test]
    fn ledger_serializes_under_cryptos_key() {
        let mut ledger = Ledger::new();
        ledger.update(&[obs("btc", 1.0, 1.0)], t0(), &RetentionPolicy::default());
        let value = serde_json::to_value(&ledger).unwrap();
        assert!(value["cryptos"]["btc"].is_object());

        let back: Ledger = serde_json::from_value(value).unwrap();
        assert_eq!(back, ledger);
    }
}
