use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for both state machines and the rate cache.
///
/// Every field has a default, so a partial JSON document is enough.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub top_up: TopUpConfig,
    pub case_opening: CaseOpeningConfig,
    pub exchange_rate: ExchangeRateConfig,
}

impl ShopConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopUpConfig {
    pub poll_interval_secs: u64,
    pub max_poll_duration_secs: u64,
    pub supported_currencies: Vec<String>,
}

impl Default for TopUpConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            max_poll_duration_secs: 600,
            supported_currencies: ["USDT", "TON", "TRX", "BTC", "ETH", "LTC", "NOT", "BNB"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TopUpConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_duration_secs)
    }

    pub fn supports(&self, currency_code: &str) -> bool {
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency_code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseOpeningConfig {
    pub min_reveal_interval_ms: u64,
}

impl Default for CaseOpeningConfig {
    fn default() -> Self {
        Self {
            min_reveal_interval_ms: 3000,
        }
    }
}

impl CaseOpeningConfig {
    pub fn min_reveal_interval(&self) -> Duration {
        Duration::from_millis(self.min_reveal_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeRateConfig {
    /// Used only when no rate was ever fetched and the fetch fails. Never cached.
    pub fallback_usd_to_local: Option<Decimal>,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            fallback_usd_to_local: Some(dec!(90)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShopConfig::default();
        assert_eq!(config.top_up.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.top_up.max_poll_duration(), Duration::from_secs(600));
        assert_eq!(
            config.case_opening.min_reveal_interval(),
            Duration::from_secs(3)
        );
        assert_eq!(config.exchange_rate.fallback_usd_to_local, Some(dec!(90)));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ShopConfig::from_json_str(
            r#"{"top_up": {"max_poll_duration_secs": 60}, "exchange_rate": {"fallback_usd_to_local": "92.5"}}"#,
        )
        .unwrap();
        assert_eq!(config.top_up.max_poll_duration(), Duration::from_secs(60));
        assert_eq!(config.top_up.poll_interval(), Duration::from_secs(3));
        assert!(config.top_up.supports("usdt"));
        assert_eq!(config.exchange_rate.fallback_usd_to_local, Some(dec!(92.5)));
        assert_eq!(config.case_opening, CaseOpeningConfig::default());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = ShopConfig::from_json_str("{\"top_up\": 3}");
        assert!(matches!(result, Err(crate::error::ShopError::Config(_))));
    }
}
