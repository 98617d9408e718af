//! moverlog core — snapshot sources, mover selection and the historical ledger.
//!
//! - Domain types (entity records, hourly points, daily averages, movers)
//! - Snapshot sources (CoinGecko markets endpoint, saved response files)
//! - Top gainer/loser selection
//! - Historical ledger: activity sweep, retention trim, daily compaction
//! - Latest-value projection for reporting
//! - JSON ledger store with atomic writes

pub mod data;
pub mod domain;
pub mod ledger;
pub mod selector;
pub mod store;

pub use domain::{
    DailyAverage, EntityId, EntityInfo, EntityRecord, HourlyPoint, MoverSummary, Observation,
};
pub use ledger::{Ledger, LedgerStats, RetentionPolicy, UpdateSummary};
pub use selector::{select_movers, Movers, DEFAULT_TOP_K};
pub use store::{JsonLedgerStore, LedgerStore, StoreError};
