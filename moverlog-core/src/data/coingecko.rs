//! CoinGecko `coins/markets` snapshot provider.
//!
//! One GET returns the top entities by market cap with their 1-hour percent
//! change. Transient failures (connect errors, timeouts, 429, 5xx) are retried
//! with exponential backoff; a 403 trips the circuit breaker straight away.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{parse_snapshots, FetchResult, SnapshotSource, SourceError};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MARKETS_URL: &str = "https://api.coingecko.com/api/v3/coins/markets";

/// Longest `Retry-After` the retry loop will wait out.
pub const MAX_RETRY_AFTER_SECS: u64 = 120;

/// Request parameters for the markets endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketsQuery {
    pub url: String,
    pub vs_currency: String,
    pub per_page: u32,
    pub page: u32,
}

impl Default for MarketsQuery {
    fn default() -> Self {
        Self {
            url: DEFAULT_MARKETS_URL.to_string(),
            vs_currency: "usd".to_string(),
            per_page: 250,
            page: 1,
        }
    }
}

impl MarketsQuery {
    /// Query-string pairs, in the order they are sent.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "1h".to_string()),
        ]
    }
}

/// Retry and timeout settings for the HTTP client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// CoinGecko markets provider.
pub struct CoinGeckoProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    query: MarketsQuery,
    policy: FetchPolicy,
}

impl CoinGeckoProvider {
    pub fn new(
        query: MarketsQuery,
        policy: FetchPolicy,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout)
            .user_agent(concat!("moverlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            query,
            policy,
        })
    }

    pub fn query(&self) -> &MarketsQuery {
        &self.query
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.policy.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Backoff for `attempt`, stretched to the provider's `Retry-After` (capped).
    fn retry_delay(&self, attempt: u32, last_error: Option<&SourceError>) -> Duration {
        let backoff = self.backoff(attempt);
        match last_error {
            Some(SourceError::RateLimited { retry_after_secs }) => {
                backoff.max(Duration::from_secs((*retry_after_secs).min(MAX_RETRY_AFTER_SECS)))
            }
            _ => backoff,
        }
    }

    fn fetch_with_retry(&self) -> Result<FetchResult, SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(SourceError::CircuitBreakerTripped);
        }

        let params = self.query.params();
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay(attempt, last_error.as_ref());
                tracing::debug!(attempt, ?delay, "retrying snapshot fetch");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(SourceError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&self.query.url).query(&params).send() {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(SourceError::Timeout(e.to_string()));
                    continue;
                }
                Err(e) if e.is_connect() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(SourceError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(SourceError::CircuitBreakerTripped);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(SourceError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(SourceError::HttpStatus {
                    status: status.as_u16(),
                });
                continue;
            }

            if !status.is_success() {
                return Err(SourceError::HttpStatus {
                    status: status.as_u16(),
                });
            }

            let payload: serde_json::Value = resp.json().map_err(|e| {
                SourceError::ResponseFormatChanged(format!("failed to parse markets response: {e}"))
            })?;

            let result = parse_snapshots(payload)?;
            self.circuit_breaker.record_success();
            if result.snapshots.is_empty() {
                return Err(SourceError::Empty);
            }
            return Ok(result);
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

impl SnapshotSource for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn fetch(&self) -> Result<FetchResult, SourceError> {
        let result = self.fetch_with_retry()?;
        tracing::info!(
            source = self.name(),
            snapshots = result.snapshots.len(),
            malformed = result.malformed,
            "fetched market snapshots"
        );
        Ok(result)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
