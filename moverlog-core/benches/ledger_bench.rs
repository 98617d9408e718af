//! Criterion benchmarks for the ledger update cycle.
//!
//! Benchmarks:
//! 1. One update over a ledger carrying ten days of hourly history
//! 2. Mover selection over a full markets page

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{Duration, TimeZone, Utc};
use moverlog_core::data::MarketSnapshot;
use moverlog_core::{select_movers, EntityInfo, Ledger, Observation, RetentionPolicy};

// ── Helpers ──────────────────────────────────────────────────────────

fn observation(i: usize, hour: i64) -> Observation {
    Observation {
        id: format!("coin-{i}"),
        info: EntityInfo {
            symbol: format!("C{i}"),
            name: format!("Coin {i}"),
            image: String::new(),
        },
        price: 100.0 + (hour as f64 * 0.1).sin() * 10.0,
        percent_change: ((i as i64 + hour) % 21 - 10) as f64,
        rank: Some(i as u32 + 1),
    }
}

/// Hourly cycles over `hours`, observing a rotating set of 20 entities.
fn seeded_ledger(entities: usize, hours: i64) -> Ledger {
    let policy = RetentionPolicy::default();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut ledger = Ledger::new();
    for h in 0..hours {
        let obs: Vec<_> = (0..20)
            .map(|j| observation((h as usize * 7 + j) % entities, h))
            .collect();
        ledger.update(&obs, start + Duration::hours(h), &policy);
    }
    ledger
}

fn snapshots(n: usize) -> Vec<MarketSnapshot> {
    (0..n)
        .map(|i| MarketSnapshot {
            id: format!("coin-{i}"),
            symbol: format!("c{i}"),
            name: format!("Coin {i}"),
            image: String::new(),
            current_price: Some(1.0 + i as f64),
            price_change_percentage_1h_in_currency: Some(((i * 37) % 101) as f64 / 10.0 - 5.0),
            market_cap_rank: Some(i as u32 + 1),
            last_updated: None,
        })
        .collect()
}

// ── 1. Ledger update ─────────────────────────────────────────────────

fn bench_ledger_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_update");
    let policy = RetentionPolicy::default();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    for entities in [50, 250] {
        let seeded = seeded_ledger(entities, 24 * 10);
        let now = start + Duration::hours(24 * 10);
        let obs: Vec<_> = (0..20).map(|i| observation(i, 240)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(entities), &seeded, |b, seeded| {
            b.iter_batched(
                || seeded.clone(),
                |mut ledger| {
                    black_box(ledger.update(&obs, now, &policy));
                    ledger
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

// ── 2. Selection ─────────────────────────────────────────────────────

fn bench_select_movers(c: &mut Criterion) {
    let snaps = snapshots(250);
    c.bench_function("select_movers_250", |b| {
        b.iter(|| black_box(select_movers(black_box(&snaps), 10)))
    });
}

criterion_group!(benches, bench_ledger_update, bench_select_movers);
criterion_main!(benches);
