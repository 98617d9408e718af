//! CSV export of ledger contents.
//!
//! - **latest**: one row per tracked entity with its current display value
//! - **history**: every retained hourly point and daily average, one row each

use anyhow::{Context, Result};
use chrono::SecondsFormat;

use moverlog_core::ledger::{project, TrackedEntity, ValueKind};
use moverlog_core::Ledger;

/// Export the latest-value projections as CSV.
///
/// Columns: id, symbol, name, is_active, first_seen, last_seen, hourly_count,
/// daily_count, value_type, timestamp, price, percent_change, rank
pub fn export_latest_csv(tracked: &[TrackedEntity]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "symbol",
        "name",
        "is_active",
        "first_seen",
        "last_seen",
        "hourly_count",
        "daily_count",
        "value_type",
        "timestamp",
        "price",
        "percent_change",
        "rank",
    ])?;

    for t in tracked {
        wtr.write_record([
            t.id.as_str(),
            &t.symbol,
            &t.name,
            &t.is_active.to_string(),
            &t.first_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            &t.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            &t.hourly_count.to_string(),
            &t.daily_count.to_string(),
            value_kind_label(t.latest.kind),
            &t.latest.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            &format!("{:.8}", t.latest.price),
            &format!("{:.4}", t.latest.percent_change),
            &t.latest.rank.map(|r| r.to_string()).unwrap_or_default(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Export every retained data point as CSV, in id order then time order.
///
/// Columns: id, symbol, series, timestamp, price, percent_change, rank,
/// sample_count. Hourly rows leave `sample_count` empty; daily rows leave
/// `rank` empty and use midnight UTC of the averaged day.
pub fn export_history_csv(ledger: &Ledger) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "symbol",
        "series",
        "timestamp",
        "price",
        "percent_change",
        "rank",
        "sample_count",
    ])?;

    for (id, rec) in ledger.iter() {
        for d in &rec.daily_averages {
            let ts = d.date.and_time(chrono::NaiveTime::MIN).and_utc();
            wtr.write_record([
                id.as_str(),
                &rec.info.symbol,
                value_kind_label(ValueKind::DailyAverage),
                &ts.to_rfc3339_opts(SecondsFormat::Secs, true),
                &format!("{:.8}", d.avg_price),
                &format!("{:.4}", d.avg_percent_change),
                "",
                &d.sample_count.to_string(),
            ])?;
        }
        for p in &rec.hourly_points {
            wtr.write_record([
                id.as_str(),
                &rec.info.symbol,
                value_kind_label(ValueKind::Hourly),
                &p.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                &format!("{:.8}", p.price),
                &format!("{:.4}", p.percent_change),
                &p.rank.map(|r| r.to_string()).unwrap_or_default(),
                "",
            ])?;
        }
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Latest-value CSV straight from a ledger.
pub fn export_ledger_latest_csv(ledger: &Ledger) -> Result<String> {
    export_latest_csv(&project(ledger))
}

fn value_kind_label(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Hourly => "hourly",
        ValueKind::DailyAverage => "daily-average",
    }
}
