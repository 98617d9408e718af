//! Snapshot sources: the CoinGecko markets provider and a file-backed source.

pub mod circuit_breaker;
pub mod coingecko;
pub mod file_source;
pub mod provider;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use coingecko::{CoinGeckoProvider, FetchPolicy, MarketsQuery, DEFAULT_MARKETS_URL};
pub use file_source::FileSource;
pub use provider::{parse_snapshots, FetchResult, MarketSnapshot, SnapshotSource, SourceError};
