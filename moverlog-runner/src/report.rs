//! The report written after every successful cycle.
//!
//! `{last_updated, gainers, losers, tracked_cryptos}`: this cycle's movers plus
//! the latest value of every entity the ledger still knows about.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use moverlog_core::data::MarketSnapshot;
use moverlog_core::ledger::TrackedEntity;
use moverlog_core::store::write_json_atomic;
use moverlog_core::{MoverSummary, Movers, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// RFC 3339, UTC.
    pub last_updated: String,
    pub gainers: Vec<MoverSummary>,
    pub losers: Vec<MoverSummary>,
    pub tracked_cryptos: Vec<TrackedEntity>,
}

impl Report {
    pub fn new(last_updated: DateTime<Utc>, movers: Movers, tracked: Vec<TrackedEntity>) -> Self {
        Self {
            last_updated: last_updated.to_rfc3339_opts(SecondsFormat::Secs, true),
            gainers: movers.gainers,
            losers: movers.losers,
            tracked_cryptos: tracked,
        }
    }

    /// Atomically replace the report at `path`.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse report {}", path.display()))
    }
}

/// The provider's own timestamp from the first snapshot, else `now`.
pub fn report_timestamp(snapshots: &[MarketSnapshot], now: DateTime<Utc>) -> DateTime<Utc> {
    snapshots
        .first()
        .and_then(|s| s.last_updated)
        .unwrap_or(now)
}
