//! FX rate cache with periodic, coalesced refresh.
//!
//! Rates map foreign currency → base currency and come from an endpoint that
//! quotes the opposite direction (base → foreign), so each quote is inverted
//! at 10 digits half-up on ingest. The base currency always carries rate 1.
//!
//! The cache is constructed once at startup and never torn down. Refresh is
//! coalesced: one in-flight refresh at a time, everyone else proceeds with
//! the stale table. Refresh failures leave the existing table in place.

use crate::error::{FxError, FxResult};
use parking_lot::RwLock;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use riskguard_core::decimal::{round_currency, FX_RATE_SCALE};

/// Rates older than this are refreshed on the next read path.
const REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Timeout for the FX endpoint.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_ENDPOINT: &str = "https://api.frankfurter.app/latest";

/// Response body of the FX endpoint: `{"rates": {"USD": 1.0786, ...}}`.
#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Decimal>,
}

/// Process-wide cache of currency → base-currency rates.
pub struct FxCache {
    base_currency: String,
    endpoint: String,
    client: Client,
    /// Currency code (upper-case) → rate to base.
    rates: RwLock<HashMap<String, Decimal>>,
    last_refresh: RwLock<Option<Instant>>,
    /// Serializes refreshes; losers of `try_lock` proceed with stale rates.
    refresh_gate: TokioMutex<()>,
}

impl FxCache {
    /// Create a cache for the given base currency using the default endpoint.
    pub fn new(base_currency: impl Into<String>) -> FxResult<Self> {
        Self::with_endpoint(base_currency, DEFAULT_ENDPOINT)
    }

    /// Create a cache against a specific FX endpoint.
    pub fn with_endpoint(
        base_currency: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> FxResult<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FxError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_currency: base_currency.into(),
            endpoint: endpoint.into(),
            client,
            rates: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            refresh_gate: TokioMutex::new(()),
        })
    }

    /// Create a cache pre-seeded with currency → base rates, marked fresh.
    ///
    /// Intended for tests and offline runs; no refresh fires within the
    /// refresh interval.
    pub fn with_rates(
        base_currency: impl Into<String>,
        rates: HashMap<String, Decimal>,
    ) -> FxResult<Self> {
        let cache = Self::new(base_currency)?;
        {
            let mut table = cache.rates.write();
            for (currency, rate) in rates {
                table.insert(currency.to_uppercase(), rate);
            }
            table.insert(cache.base_currency.to_uppercase(), Decimal::ONE);
        }
        *cache.last_refresh.write() = Some(Instant::now());
        Ok(cache)
    }

    #[must_use]
    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Convert an amount to the base currency.
    ///
    /// Base-currency amounts pass through unchanged, as do amounts without a
    /// currency or without a cached rate (logged; treated as rate 1).
    /// Converted amounts round to scale 2 half-up. Never fails.
    #[must_use]
    pub fn convert_to_base(&self, amount: Decimal, from_currency: Option<&str>) -> Decimal {
        let Some(currency) = from_currency else {
            return amount;
        };
        if currency.eq_ignore_ascii_case(&self.base_currency) {
            return amount;
        }

        let rate = self.rates.read().get(&currency.to_uppercase()).copied();
        match rate {
            Some(rate) => round_currency(amount * rate),
            None => {
                warn!(currency, "no exchange rate cached, using 1:1");
                amount
            }
        }
    }

    /// Refresh the rate table when it is older than the refresh interval.
    ///
    /// Coalesced: if another refresh is in flight this returns immediately
    /// and the caller proceeds with the current table.
    pub async fn refresh_if_stale(&self) {
        if !self.is_stale() {
            return;
        }
        let Ok(_guard) = self.refresh_gate.try_lock() else {
            return;
        };
        // Re-check under the gate: the previous holder may have refreshed.
        if self.is_stale() {
            self.refresh_rates().await;
        }
    }

    /// Force a refresh now (startup priming). Failures are logged, never
    /// surfaced.
    pub async fn refresh(&self) {
        let _guard = self.refresh_gate.lock().await;
        self.refresh_rates().await;
    }

    fn is_stale(&self) -> bool {
        match *self.last_refresh.read() {
            Some(at) => at.elapsed() > REFRESH_INTERVAL,
            None => true,
        }
    }

    async fn refresh_rates(&self) {
        info!(base = %self.base_currency, "Refreshing exchange rates");

        let url = format!("{}?from={}", self.endpoint, self.base_currency);
        let quotes = match self.fetch_quotes(&url).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Failed to refresh exchange rates, keeping current table");
                return;
            }
        };

        let inverted = invert_quotes(&self.base_currency, &quotes);
        let count = inverted.len();
        *self.rates.write() = inverted;
        *self.last_refresh.write() = Some(Instant::now());
        info!(currencies = count, "Refreshed exchange rates");
    }

    async fn fetch_quotes(&self, url: &str) -> FxResult<HashMap<String, Decimal>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FxError::HttpClient(format!("FX request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FxError::HttpClient(format!("FX endpoint returned {status}")));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| FxError::MalformedResponse(e.to_string()))?;
        Ok(body.rates)
    }
}

/// Invert base → foreign quotes into foreign → base rates.
///
/// Each quote divides into 1 at 10 digits half-up; zero quotes are skipped.
/// The base currency is recorded as rate 1.
fn invert_quotes(base_currency: &str, quotes: &HashMap<String, Decimal>) -> HashMap<String, Decimal> {
    let mut rates = HashMap::with_capacity(quotes.len() + 1);
    rates.insert(base_currency.to_uppercase(), Decimal::ONE);

    for (currency, quote) in quotes {
        if quote.is_zero() {
            warn!(currency, "skipping zero FX quote");
            continue;
        }
        let to_base = (Decimal::ONE / quote)
            .round_dp_with_strategy(FX_RATE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rates.insert(currency.to_uppercase(), to_base);
    }
    rates
}
