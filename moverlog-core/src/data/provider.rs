//! Snapshot source trait and structured error types.
//!
//! The SnapshotSource trait abstracts over where market snapshots come from
//! (CoinGecko, a fixture file, a test double) so the cycle can be driven
//! without network access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entity as returned by the markets endpoint.
///
/// Only `id` is mandatory. Everything else may be absent or `null`; the
/// selector decides what is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Structured error types for snapshot fetching.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from provider")]
    HttpStatus { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider returned no snapshots")]
    Empty,

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("source error: {0}")]
    Other(String),
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub snapshots: Vec<MarketSnapshot>,
    /// Elements of the response that could not be parsed and were dropped.
    pub malformed: usize,
}

/// Trait for snapshot sources.
///
/// Implementations fetch one batch of entity snapshots at a single point in
/// time. Persistence and selection sit above this trait.
pub trait SnapshotSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the current batch of snapshots.
    fn fetch(&self) -> Result<FetchResult, SourceError>;

    /// Check if the source is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Parse a JSON array of entity objects, one element at a time.
///
/// Elements that fail to deserialize are counted as malformed and skipped so a
/// single bad entity never poisons the batch. A non-array payload is an error.
pub fn parse_snapshots(payload: serde_json::Value) -> Result<FetchResult, SourceError> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(SourceError::ResponseFormatChanged(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut snapshots = Vec::with_capacity(items.len());
    let mut malformed = 0;
    for item in items {
        match serde_json::from_value::<MarketSnapshot>(item) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                tracing::debug!("skipping malformed snapshot: {e}");
                malformed += 1;
            }
        }
    }

    Ok(FetchResult {
        snapshots,
        malformed,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parses_full_entity() {
        let payload = json!([{
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://example.com/btc.png",
            "current_price": 64000.5,
            "price_change_percentage_1h_in_currency": 0.42,
            "market_cap_rank": 1,
            "last_updated": "2024-03-01T12:00:05.123Z"
        }]);
        let result = parse_snapshots(payload).unwrap();
        assert_eq!(result.malformed, 0);
        let snap = &result.snapshots[0];
        assert_eq!(snap.id, "bitcoin");
        assert_eq!(snap.current_price, Some(64000.5));
        assert_eq!(snap.price_change_percentage_1h_in_currency, Some(0.42));
        assert_eq!(snap.market_cap_rank, Some(1));
        assert_eq!(
            snap.last_updated.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap().timestamp()
        );
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let payload = json!([{
            "id": "ethereum",
            "last_updated": "2024-03-01T14:00:00+02:00"
        }]);
        let result = parse_snapshots(payload).unwrap();
        assert_eq!(
            result.snapshots[0].last_updated,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn null_change_is_kept_as_none() {
        let payload = json!([{
            "id": "tether",
            "current_price": 1.0,
            "price_change_percentage_1h_in_currency": null,
            "market_cap_rank": null
        }]);
        let result = parse_snapshots(payload).unwrap();
        assert_eq!(result.snapshots[0].price_change_percentage_1h_in_currency, None);
        assert_eq!(result.snapshots[0].market_cap_rank, None);
    }

    #[test]
    fn malformed_elements_are_skipped() {
        let payload = json!([
            {"id": "good", "current_price": 1.0},
            {"symbol": "no-id"},
            {"id": "bad-price", "current_price": "expensive"},
            {"id": "bad-time", "last_updated": "yesterday"},
            42
        ]);
        let result = parse_snapshots(payload).unwrap();
        assert_eq!(result.snapshots.len(), 1);
        assert_eq!(result.snapshots[0].id, "good");
        assert_eq!(result.malformed, 4);
    }

    #[test]
    fn non_array_payload_is_format_error() {
        let err = parse_snapshots(json!({"status": {"error_code": 429}})).unwrap_err();
        assert!(matches!(err, SourceError::ResponseFormatChanged(_)));
    }
}
