use crate::config::ExchangeRateConfig;
use crate::domain::money::{Amount, Balance, ExchangeRate};
use crate::domain::ports::SharedLedger;
use crate::error::{LedgerError, Result, ShopError};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Process-wide USD to local rate, fetched lazily and refreshed on request.
///
/// Once a valid rate has been observed the cache never goes back to empty: a
/// failed refresh leaves the previous rate in effect. Fetches are serialized
/// through `fetch_gate`, so concurrent first callers share one request.
pub struct ExchangeRateCache {
    ledger: SharedLedger,
    config: ExchangeRateConfig,
    cached: RwLock<Option<ExchangeRate>>,
    fetch_gate: Mutex<()>,
}

impl ExchangeRateCache {
    pub fn new(ledger: SharedLedger, config: ExchangeRateConfig) -> Self {
        Self {
            ledger,
            config,
            cached: RwLock::new(None),
            fetch_gate: Mutex::new(()),
        }
    }

    /// Returns the cached rate, fetching it first if none is cached yet.
    ///
    /// If that first fetch fails and a fallback rate is configured, the
    /// fallback is returned but not cached, so the next call fetches again.
    pub async fn get(&self) -> Result<ExchangeRate> {
        if let Some(rate) = *self.cached.read().await {
            return Ok(rate);
        }
        let _gate = self.fetch_gate.lock().await;
        // Another caller may have fetched while we waited for the gate.
        if let Some(rate) = *self.cached.read().await {
            return Ok(rate);
        }
        match self.fetch().await {
            Ok(rate) => Ok(rate),
            Err(e) => match self.config.fallback_usd_to_local {
                Some(fallback) => {
                    tracing::warn!("using fallback exchange rate {}: {}", fallback, e);
                    ExchangeRate::new(fallback, Instant::now())
                }
                None => Err(e),
            },
        }
    }

    /// Always fetches a fresh rate from the ledger.
    pub async fn refresh(&self) -> Result<ExchangeRate> {
        let _gate = self.fetch_gate.lock().await;
        self.fetch().await
    }

    /// Fetches and caches a rate. Callers hold `fetch_gate`.
    async fn fetch(&self) -> Result<ExchangeRate> {
        let fetched = self
            .ledger
            .exchange_rate()
            .await
            .map_err(ShopError::RateFetchFailed)?;
        let rate = ExchangeRate::new(fetched, Instant::now()).map_err(|_| {
            ShopError::RateFetchFailed(LedgerError::Malformed(format!(
                "non-positive exchange rate {}",
                fetched
            )))
        })?;

        *self.cached.write().await = Some(rate);
        tracing::debug!("exchange rate refreshed: 1 USD = {}", rate.usd_to_local());
        Ok(rate)
    }

    /// The cached rate without triggering a fetch.
    pub async fn peek(&self) -> Option<ExchangeRate> {
        *self.cached.read().await
    }

    /// Converts a USD amount with the current rate (round-half-up).
    pub async fn to_local(&self, amount_usd: Amount) -> Result<Balance> {
        self.get().await?.to_local(amount_usd)
    }
}
