//! Top-mover selection.
//!
//! Pure function of the snapshot batch: usable snapshots are stable-sorted by
//! 1-hour percent change, descending. Gainers are the head of that ordering,
//! losers the tail read backwards (worst first).

use crate::data::MarketSnapshot;
use crate::domain::{MoverSummary, Observation};

pub const DEFAULT_TOP_K: usize = 10;

/// Gainers and losers selected from one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Movers {
    pub gainers: Vec<MoverSummary>,
    pub losers: Vec<MoverSummary>,
}

impl Movers {
    /// Observations for the ledger: gainers then losers, in list order.
    ///
    /// An id present in both lists appears twice; the ledger keeps the last.
    pub fn observations(&self) -> Vec<Observation> {
        self.gainers
            .iter()
            .chain(self.losers.iter())
            .map(MoverSummary::to_observation)
            .collect()
    }
}

/// Report summary for a snapshot, or `None` if it lacks a finite price or
/// percent change.
pub fn summarize(snapshot: &MarketSnapshot) -> Option<MoverSummary> {
    let change = snapshot
        .price_change_percentage_1h_in_currency
        .filter(|c| c.is_finite())?;
    let price = snapshot.current_price.filter(|p| p.is_finite())?;
    Some(MoverSummary {
        id: snapshot.id.clone(),
        symbol: snapshot.symbol.to_uppercase(),
        name: snapshot.name.clone(),
        image: snapshot.image.clone(),
        current_price: price,
        price_change_1h: change,
        market_cap_rank: snapshot.market_cap_rank,
    })
}

/// Select the top `k` gainers and losers.
pub fn select_movers(snapshots: &[MarketSnapshot], k: usize) -> Movers {
    let mut ranked: Vec<MoverSummary> = snapshots.iter().filter_map(summarize).collect();

    // `sort_by` is stable, so ties keep input order.
    ranked.sort_by(|a, b| b.price_change_1h.total_cmp(&a.price_change_1h));

    let gainers = ranked.iter().take(k).cloned().collect();
    let losers = ranked.iter().rev().take(k).cloned().collect();

    Movers { gainers, losers }
}
