//! One snapshot cycle: load, fetch, select, update, persist, report.
//!
//! The ledger is persisted before the report is written, so a report on disk
//! never describes state that was not saved.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use moverlog_core::data::{SnapshotSource, SourceError};
use moverlog_core::ledger::project;
use moverlog_core::selector::summarize;
use moverlog_core::{select_movers, Ledger, LedgerStore, RetentionPolicy, StoreError, UpdateSummary};

use crate::report::{report_timestamp, Report};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("snapshot source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("failed to load ledger: {0}")]
    LedgerLoad(#[source] StoreError),

    #[error("failed to persist ledger: {0}")]
    PersistWriteFailure(#[source] StoreError),

    #[error("failed to write report: {0}")]
    ReportWriteFailure(#[source] StoreError),
}

/// Knobs a cycle needs beyond its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    pub top_k: usize,
    pub policy: RetentionPolicy,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            top_k: moverlog_core::DEFAULT_TOP_K,
            policy: RetentionPolicy::default(),
        }
    }
}

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub fetched: usize,
    /// Response elements dropped by the parser.
    pub malformed: usize,
    /// Parsed snapshots without a usable price or change.
    pub unusable: usize,
    pub gainers: usize,
    pub losers: usize,
    pub tracked: usize,
    /// The ledger started empty because the persisted file was corrupt.
    pub recovered_from_corrupt: bool,
    pub update: UpdateSummary,
    pub report: Report,
}

/// Run one cycle at `now`.
///
/// A fetch failure or an empty fetch leaves the persisted ledger and report
/// untouched.
pub fn run_cycle(
    source: &dyn SnapshotSource,
    store: &dyn LedgerStore,
    report_path: &Path,
    settings: &CycleSettings,
    now: DateTime<Utc>,
) -> Result<CycleOutcome, CycleError> {
    let loaded = load(store)?;

    let fetch = source.fetch()?;
    if fetch.snapshots.is_empty() {
        return Err(CycleError::SourceUnavailable(SourceError::Empty));
    }

    let recovered_from_corrupt = loaded.is_none();
    let mut ledger = match loaded {
        Some(ledger) => ledger,
        None => {
            store.quarantine().map_err(CycleError::LedgerLoad)?;
            Ledger::new()
        }
    };

    let fetched = fetch.snapshots.len();
    let unusable = fetch
        .snapshots
        .iter()
        .filter(|s| summarize(s).is_none())
        .count();
    if fetch.malformed + unusable > 0 {
        tracing::warn!(
            "skipped {} malformed and {} unusable snapshots from {}",
            fetch.malformed,
            unusable,
            source.name()
        );
    }

    let movers = select_movers(&fetch.snapshots, settings.top_k);
    let update = ledger.update(&movers.observations(), now, &settings.policy);
    let tracked = project(&ledger);

    store.save(&ledger).map_err(CycleError::PersistWriteFailure)?;

    let outcome_counts = (movers.gainers.len(), movers.losers.len(), tracked.len());
    let report = Report::new(report_timestamp(&fetch.snapshots, now), movers, tracked);
    report
        .write(report_path)
        .map_err(CycleError::ReportWriteFailure)?;

    let (gainers, losers, tracked) = outcome_counts;
    tracing::info!(
        "cycle complete: {fetched} fetched, {gainers} gainers, {losers} losers, \
         {tracked} tracked ({} new, {} deactivated, {} points compacted)",
        update.created,
        update.deactivated,
        update.points_compacted
    );

    Ok(CycleOutcome {
        fetched,
        malformed: fetch.malformed,
        unusable,
        gainers,
        losers,
        tracked,
        recovered_from_corrupt,
        update,
        report,
    })
}

/// Load the ledger; `None` if the persisted copy is corrupt.
///
/// A corrupt copy is only moved aside once the fetch has succeeded, and if it
/// cannot be moved the cycle aborts so the save cannot clobber it.
fn load(store: &dyn LedgerStore) -> Result<Option<Ledger>, CycleError> {
    match store.load() {
        Ok(ledger) => Ok(Some(ledger)),
        Err(e @ StoreError::Corrupt { .. }) => {
            tracing::warn!("{e}; starting from an empty ledger");
            Ok(None)
        }
        Err(e) => Err(CycleError::LedgerLoad(e)),
    }
}
