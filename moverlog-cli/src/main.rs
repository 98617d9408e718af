//! moverlog CLI — snapshot cycles, ledger inspection and export.
//!
//! Commands:
//! - `run` — one cycle: fetch, select movers, update the ledger, write the report
//! - `watch` — run cycles on a fixed interval until stopped
//! - `status` — summarise the persisted ledger and verify its content hash
//! - `export` — write ledger contents as CSV
//! - `config` — print the effective configuration as TOML

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use moverlog_core::data::{CircuitBreaker, CoinGeckoProvider, FileSource, SnapshotSource};
use moverlog_core::{JsonLedgerStore, LedgerStore};
use moverlog_runner::{
    export_history_csv, export_ledger_latest_csv, run_cycle, CycleOutcome, TrackerConfig,
};

#[derive(Parser)]
#[command(
    name = "moverlog",
    about = "moverlog — hourly top-mover tracker with a compacting price ledger"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Paths {
    /// Path to a TOML config file. Falls back to ./moverlog.toml, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger file (overrides `output.ledger_path`).
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Report file (overrides `output.report_path`).
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single snapshot cycle.
    Run {
        #[command(flatten)]
        paths: Paths,

        /// Read snapshots from a saved markets response instead of the network.
        #[arg(long)]
        snapshot_file: Option<PathBuf>,
    },
    /// Run snapshot cycles on a fixed interval.
    Watch {
        #[command(flatten)]
        paths: Paths,

        /// Minutes between cycle starts.
        #[arg(long, default_value_t = 60)]
        interval_mins: u64,

        /// Stop after this many cycles. Runs until interrupted when omitted.
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Summarise the persisted ledger.
    Status {
        #[command(flatten)]
        paths: Paths,
    },
    /// Export ledger contents as CSV.
    Export {
        #[command(flatten)]
        paths: Paths,

        /// Output CSV file.
        #[arg(long)]
        output: PathBuf,

        /// Which rows to export.
        #[arg(long, value_enum, default_value_t = ExportKind::Latest)]
        kind: ExportKind,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[command(flatten)]
        paths: Paths,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    /// One row per tracked entity with its latest value.
    Latest,
    /// Every retained hourly point and daily average.
    History,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        ))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            paths,
            snapshot_file,
        } => run_once(&paths, snapshot_file),
        Commands::Watch {
            paths,
            interval_mins,
            max_cycles,
        } => run_watch(&paths, interval_mins, max_cycles),
        Commands::Status { paths } => run_status(&paths),
        Commands::Export {
            paths,
            output,
            kind,
        } => run_export(&paths, &output, kind),
        Commands::Config { paths } => {
            let config = load_config(&paths)?;
            print!("{}", config.to_toml().context("failed to render config")?);
            Ok(())
        }
    }
}

/// `RUST_LOG` directives if set and valid, else `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

const DEFAULT_CONFIG_FILE: &str = "moverlog.toml";

/// Load `--config`, else `moverlog.toml` if present, then apply path overrides.
fn load_config(paths: &Paths) -> Result<TrackerConfig> {
    let implicit = Path::new(DEFAULT_CONFIG_FILE);
    let config_path = paths
        .config
        .as_deref()
        .or_else(|| implicit.exists().then_some(implicit));
    let mut config =
        TrackerConfig::load(config_path).context("failed to load configuration")?;
    if let Some(ledger) = &paths.ledger {
        config.output.ledger_path = ledger.clone();
    }
    if let Some(report) = &paths.report {
        config.output.report_path = report.clone();
    }
    Ok(config)
}

fn network_source(config: &TrackerConfig, breaker: Arc<CircuitBreaker>) -> Result<CoinGeckoProvider> {
    CoinGeckoProvider::new(config.markets_query(), config.fetch_policy(), breaker)
        .context("failed to build HTTP client")
}

fn run_once(paths: &Paths, snapshot_file: Option<PathBuf>) -> Result<()> {
    let config = load_config(paths)?;
    let source: Box<dyn SnapshotSource> = match snapshot_file {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(network_source(
            &config,
            Arc::new(CircuitBreaker::default_provider()),
        )?),
    };

    let outcome = cycle(&config, source.as_ref())?;
    print_outcome(&outcome, &config);
    Ok(())
}

fn run_watch(paths: &Paths, interval_mins: u64, max_cycles: Option<u64>) -> Result<()> {
    if interval_mins == 0 {
        bail!("--interval-mins must be at least 1");
    }
    let config = load_config(paths)?;
    let interval = Duration::from_secs(interval_mins * 60);
    // Shared across cycles.
    let breaker = Arc::new(CircuitBreaker::default_provider());
    let source = network_source(&config, Arc::clone(&breaker))?;

    tracing::info!(
        "watching {} every {interval_mins} min",
        config.source.url
    );

    let mut completed = 0_u64;
    loop {
        let started = std::time::Instant::now();
        if !source.is_available() {
            tracing::warn!(
                "source blocked, skipping cycle ({:?} cooldown left)",
                breaker.remaining_cooldown()
            );
        } else {
            match cycle(&config, &source) {
                Ok(outcome) => print_outcome(&outcome, &config),
                Err(e) => tracing::error!("cycle failed: {e:#}"),
            }
        }

        completed += 1;
        if max_cycles.is_some_and(|max| completed >= max) {
            break;
        }
        std::thread::sleep(interval.saturating_sub(started.elapsed()));
    }
    Ok(())
}

fn cycle(config: &TrackerConfig, source: &dyn SnapshotSource) -> Result<CycleOutcome> {
    let store = JsonLedgerStore::new(&config.output.ledger_path);
    run_cycle(
        source,
        &store,
        &config.output.report_path,
        &config.cycle_settings(),
        Utc::now(),
    )
    .with_context(|| format!("cycle against {} failed", source.name()))
}

fn print_outcome(outcome: &CycleOutcome, config: &TrackerConfig) {
    println!(
        "{}: {} fetched, {} gainers, {} losers, {} tracked -> {}",
        outcome.report.last_updated,
        outcome.fetched,
        outcome.gainers,
        outcome.losers,
        outcome.tracked,
        config.output.report_path.display()
    );
}

fn run_status(paths: &Paths) -> Result<()> {
    let config = load_config(paths)?;
    let store = JsonLedgerStore::new(&config.output.ledger_path);

    if !store.path().exists() {
        println!("No ledger at {}", store.path().display());
        return Ok(());
    }

    let ledger = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    let stats = ledger.stats();

    println!("Ledger: {}", store.path().display());
    println!("  Entities:        {}", stats.entities);
    println!("  Active:          {}", stats.active);
    println!("  Hourly points:   {}", stats.hourly_points);
    println!("  Daily averages:  {}", stats.daily_averages);

    match store.read_meta() {
        Some(meta) => {
            println!("  Last saved:      {}", meta.saved_at.to_rfc3339());
            let verdict = match store.verify() {
                Some(true) => "ok",
                Some(false) => "MISMATCH (ledger edited outside moverlog?)",
                None => "unavailable",
            };
            println!("  Content hash:    {verdict}");
        }
        None => println!("  Metadata:        missing"),
    }

    Ok(())
}

fn run_export(paths: &Paths, output: &Path, kind: ExportKind) -> Result<()> {
    let config = load_config(paths)?;
    let store = JsonLedgerStore::new(&config.output.ledger_path);
    let ledger = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    let csv = match kind {
        ExportKind::Latest => export_ledger_latest_csv(&ledger)?,
        ExportKind::History => export_history_csv(&ledger)?,
    };
    std::fs::write(output, csv)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Exported {} entities to {}",
        ledger.len(),
        output.display()
    );
    Ok(())
}
