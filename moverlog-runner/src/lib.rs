//! moverlog runner — cycle orchestration, configuration, report output and export.

pub mod config;
pub mod cycle;
pub mod export;
pub mod report;

pub use config::{ConfigError, TrackerConfig};
pub use cycle::{run_cycle, CycleError, CycleOutcome, CycleSettings};
pub use export::{export_history_csv, export_latest_csv, export_ledger_latest_csv};
pub use report::{report_timestamp, Report};
