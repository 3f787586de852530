//! Market data acquisition: HTTP adapters for Yahoo Finance and Alpha Vantage,
//! a shared rate gate, retry with exponential backoff, deterministic synthetic
//! history, and the [`MarketFetcher`] that chains them with provenance tags.

pub mod alpha_vantage;
pub mod fetcher;
pub mod http;
pub mod rate_gate;
pub mod retry;
pub mod synthetic;
pub mod yahoo;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use alpha_vantage::AlphaVantageSource;
pub use fetcher::{FetchState, MarketFetcher, DEFAULT_SYNTHETIC_LENGTH, SYNTHETIC_SOURCE};
pub use http::SourceClient;
pub use rate_gate::RateGate;
pub use retry::{with_retry, RetryPolicy};
pub use synthetic::SyntheticHistory;
pub use yahoo::YahooSource;
