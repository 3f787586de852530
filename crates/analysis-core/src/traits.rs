use async_trait::async_trait;

use crate::{
    CompanyInfo, EarningsReport, FinancialMetrics, NewsItem, PriceBar, Quote, SourceError,
    SourceKind, Ticker,
};

/// Capability interface shared by every market data provider.
///
/// Operations a provider cannot serve return [`SourceError::Unsupported`] so the
/// fetcher can move on to the next source.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Stable name, also used as the rate-gate key
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    /// Daily bars covering roughly the last `lookback_days` calendar days
    async fn get_history(&self, ticker: &Ticker, lookback_days: u32) -> Result<Vec<PriceBar>, SourceError>;

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, SourceError>;

    async fn get_fundamentals(&self, ticker: &Ticker) -> Result<FinancialMetrics, SourceError>;

    /// Most recent news first, at most `limit` items
    async fn get_news(&self, ticker: &Ticker, limit: usize) -> Result<Vec<NewsItem>, SourceError>;

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, SourceError>;

    async fn get_earnings(&self, ticker: &Ticker) -> Result<EarningsReport, SourceError>;
}
