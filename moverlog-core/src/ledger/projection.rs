//! Latest-value projection of ledger records for the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Ledger;
use crate::domain::{EntityId, EntityRecord};

/// Which series a latest value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Hourly,
    DailyAverage,
}

/// The current display value of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestValue {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    /// Point timestamp, or midnight UTC of the averaged day.
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub percent_change: f64,
    /// Always `None` for daily averages.
    pub rank: Option<u32>,
}

/// One entry of the report's `tracked_cryptos` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: EntityId,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub is_active: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub hourly_count: usize,
    pub daily_count: usize,
    pub latest: LatestValue,
}

/// Last hourly point if any, else last daily average, else nothing.
pub fn latest_value(record: &EntityRecord) -> Option<LatestValue> {
    if let Some(p) = record.hourly_points.last() {
        return Some(LatestValue {
            kind: ValueKind::Hourly,
            timestamp: p.timestamp,
            price: p.price,
            percent_change: p.percent_change,
            rank: p.rank,
        });
    }

    record.daily_averages.last().map(|d| LatestValue {
        kind: ValueKind::DailyAverage,
        timestamp: d.date.and_time(chrono::NaiveTime::MIN).and_utc(),
        price: d.avg_price,
        percent_change: d.avg_percent_change,
        rank: None,
    })
}

/// Project every record that has a latest value, in ascending id order.
pub fn project(ledger: &Ledger) -> Vec<TrackedEntity> {
    ledger
        .iter()
        .filter_map(|(id, record)| {
            let latest = latest_value(record)?;
            Some(TrackedEntity {
                id: id.clone(),
                symbol: record.info.symbol.clone(),
                name: record.info.name.clone(),
                image: record.info.image.clone(),
                is_active: record.is_active,
                first_seen: record.first_seen,
                last_seen: record.last_seen,
                hourly_count: record.hourly_points.len(),
                daily_count: record.daily_averages.len(),
                latest,
            })
        })
        .collect()
}
