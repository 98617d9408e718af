//! Domain types shared by the selector, ledger and report layers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable entity identifier (e.g. `"bitcoin"`).
pub type EntityId = String;

/// Display metadata for a tracked entity. Last write wins on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub symbol: String,
    pub name: String,
    pub image: String,
}

/// One raw observation kept at full resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub percent_change: f64,
    pub rank: Option<u32>,
}

/// Mean of every compacted sample of one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub avg_price: f64,
    pub avg_percent_change: f64,
    pub sample_count: usize,
}

/// Tracking record for one entity.
///
/// `hourly_points` and `daily_averages` are both kept in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub info: EntityInfo,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub hourly_points: Vec<HourlyPoint>,
    #[serde(default)]
    pub daily_averages: Vec<DailyAverage>,
}

impl EntityRecord {
    /// Fresh record for an entity first observed at `now`.
    pub fn new(info: EntityInfo, now: DateTime<Utc>) -> Self {
        Self {
            info,
            first_seen: now,
            last_seen: now,
            is_active: true,
            hourly_points: Vec::new(),
            daily_averages: Vec::new(),
        }
    }

    /// True when neither series holds any data.
    pub fn is_empty(&self) -> bool {
        self.hourly_points.is_empty() && self.daily_averages.is_empty()
    }
}

/// One entity as observed in the current cycle, ready to fold into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: EntityId,
    pub info: EntityInfo,
    pub price: f64,
    pub percent_change: f64,
    pub rank: Option<u32>,
}

/// A selected mover as it appears in the report's `gainers`/`losers` lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoverSummary {
    pub id: EntityId,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: f64,
    pub price_change_1h: f64,
    pub market_cap_rank: Option<u32>,
}

impl MoverSummary {
    pub fn to_observation(&self) -> Observation {
        Observation {
            id: self.id.clone(),
            info: EntityInfo {
                symbol: self.symbol.clone(),
                name: self.name.clone(),
                image: self.image.clone(),
            },
            price: self.current_price,
            percent_change: self.price_change_1h,
            rank: self.market_cap_rank,
        }
    }
}
