use anyhow::{bail, Context, Result};
use fundamental_analysis::SectorPeTable;
use market_data::{AlphaVantageSource, RateGate, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::opportunity::OpportunityWeights;

/// Sector PE table and opportunity weights, loadable from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub pe_table: SectorPeTable,
    #[serde(default)]
    pub weights: OpportunityWeights,
}

impl ScoringConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scoring config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scoring config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pe_table.validate()?;
        self.weights.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub alpha_vantage_api_key: Option<String>,
    pub request_delay: Duration,
    pub alpha_vantage_delay: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub http_timeout: Duration,
    pub history_lookback_days: u32,
    pub synthetic_length: usize,
    pub news_limit: usize,
    pub headline_limit: usize,
    /// Headlines scored per scan candidate; 0 skips the news fetch
    pub scan_news_limit: usize,
    pub price_history_points: usize,
    pub scan_concurrency: usize,
    pub ticker_timeout: Duration,
    pub scoring: ScoringConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_api_key: None,
            request_delay: Duration::from_millis(1000),
            alpha_vantage_delay: Duration::from_millis(12_000),
            max_retries: 3,
            retry_base: Duration::from_millis(2000),
            http_timeout: Duration::from_secs(20),
            history_lookback_days: 365,
            synthetic_length: 250,
            news_limit: 20,
            headline_limit: 5,
            scan_news_limit: 3,
            price_history_points: 90,
            scan_concurrency: 4,
            ticker_timeout: Duration::from_secs(30),
            scoring: ScoringConfig::default(),
        }
    }
}

fn var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", name, raw))
}

impl ScannerConfig {
    /// Reads the process environment; call `dotenvy::dotenv()` first to pick up `.env`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let scoring = match lookup("SCORING_CONFIG").filter(|p| !p.trim().is_empty()) {
            Some(path) => ScoringConfig::load(path.trim())?,
            None => ScoringConfig::default(),
        };

        let config = Self {
            alpha_vantage_api_key: lookup("ALPHA_VANTAGE_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            request_delay: Duration::from_millis(var(&lookup, "REQUEST_DELAY_MS", "1000")?),
            alpha_vantage_delay: Duration::from_millis(var(&lookup, "ALPHA_VANTAGE_DELAY_MS", "12000")?),
            max_retries: var(&lookup, "MAX_RETRIES", "3")?,
            retry_base: Duration::from_millis(var(&lookup, "RETRY_BASE_MS", "2000")?),
            http_timeout: Duration::from_secs(var(&lookup, "HTTP_TIMEOUT_SECS", "20")?),
            history_lookback_days: var(&lookup, "HISTORY_LOOKBACK_DAYS", "365")?,
            synthetic_length: var(&lookup, "SYNTHETIC_LENGTH", "250")?,
            news_limit: var(&lookup, "NEWS_LIMIT", "20")?,
            headline_limit: var(&lookup, "HEADLINE_LIMIT", "5")?,
            scan_news_limit: var(&lookup, "SCAN_NEWS_LIMIT", "3")?,
            price_history_points: var(&lookup, "PRICE_HISTORY_POINTS", "90")?,
            scan_concurrency: var(&lookup, "SCAN_CONCURRENCY", "4")?,
            ticker_timeout: Duration::from_secs(var(&lookup, "TICKER_TIMEOUT_SECS", "30")?),
            scoring,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_concurrency == 0 {
            bail!("SCAN_CONCURRENCY must be at least 1");
        }
        if self.ticker_timeout.is_zero() {
            bail!("TICKER_TIMEOUT_SECS must be at least 1");
        }
        self.scoring.validate()
    }

    /// One gate per process, shared by every adapter
    pub fn rate_gate(&self) -> Arc<RateGate> {
        Arc::new(
            RateGate::new(self.request_delay)
                .with_source_delay(AlphaVantageSource::NAME, self.alpha_vantage_delay),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ScannerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.alpha_vantage_api_key, None);
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert_eq!(config.alpha_vantage_delay, Duration::from_secs(12));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.scan_concurrency, 4);
        assert_eq!(config.scan_news_limit, 3);
        assert_eq!(config.ticker_timeout, Duration::from_secs(30));
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ScannerConfig::from_lookup(lookup(&[
            ("ALPHA_VANTAGE_API_KEY", " demo "),
            ("REQUEST_DELAY_MS", "250"),
            ("SCAN_CONCURRENCY", "8"),
            ("NEWS_LIMIT", "10"),
        ]))
        .unwrap();
        assert_eq!(config.alpha_vantage_api_key.as_deref(), Some("demo"));
        assert_eq!(config.request_delay, Duration::from_millis(250));
        assert_eq!(config.scan_concurrency, 8);
        assert_eq!(config.news_limit, 10);

        let gate = config.rate_gate();
        assert_eq!(gate.min_delay("yahoo"), Duration::from_millis(250));
        assert_eq!(gate.min_delay(AlphaVantageSource::NAME), Duration::from_secs(12));
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = ScannerConfig::from_lookup(lookup(&[("ALPHA_VANTAGE_API_KEY", "  ")])).unwrap();
        assert!(config.alpha_vantage_api_key.is_none());
    }

    #[test]
    fn test_malformed_number_is_error() {
        let err = ScannerConfig::from_lookup(lookup(&[("MAX_RETRIES", "three")])).unwrap_err();
        assert!(err.to_string().contains("MAX_RETRIES"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(ScannerConfig::from_lookup(lookup(&[("SCAN_CONCURRENCY", "0")])).is_err());
    }

    #[test]
    fn test_scoring_file() {
        let path = std::env::temp_dir().join(format!("scoring-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"sector_pe": {"Technology": 30.0}, "default_pe": 18.0, "weights": {"valuation": 1.0, "growth": 1.0, "technical": 2.0}}"#,
        )
        .unwrap();

        let config =
            ScannerConfig::from_lookup(lookup(&[("SCORING_CONFIG", path.to_str().unwrap())])).unwrap();
        assert_eq!(config.scoring.pe_table.average_pe(Some("technology")), 30.0);
        assert_eq!(config.scoring.pe_table.default_pe, 18.0);
        assert_eq!(config.scoring.weights.technical, 2.0);

        std::fs::write(&path, r#"{"weights": {"valuation": 0.0, "growth": 0.0, "technical": 0.0}}"#).unwrap();
        assert!(ScannerConfig::from_lookup(lookup(&[("SCORING_CONFIG", path.to_str().unwrap())])).is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_scoring_file() {
        let err = ScoringConfig::load("/nonexistent/scoring.json").unwrap_err();
        assert!(err.to_string().contains("reading scoring config"));
    }
}
