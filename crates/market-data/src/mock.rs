//! Scripted in-memory source for tests of the fetcher and its callers.

use analysis_core::{
    CompanyInfo, EarningsReport, FinancialMetrics, MarketDataSource, NewsItem, PriceBar, Quote,
    SourceError, SourceKind, Ticker,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Canned answers for one ticker
#[derive(Debug, Clone)]
pub struct TickerScript {
    pub history: Result<Vec<PriceBar>, SourceError>,
    pub quote: Result<(f64, Option<f64>), SourceError>,
    pub fundamentals: Result<FinancialMetrics, SourceError>,
    pub news: Result<Vec<NewsItem>, SourceError>,
    pub company: Result<CompanyInfo, SourceError>,
    pub earnings: Result<EarningsReport, SourceError>,
}

impl TickerScript {
    /// Every operation fails with `err`
    pub fn failing(err: SourceError) -> Self {
        Self {
            history: Err(err.clone()),
            quote: Err(err.clone()),
            fundamentals: Err(err.clone()),
            news: Err(err.clone()),
            company: Err(err.clone()),
            earnings: Err(err),
        }
    }

    pub fn unavailable() -> Self {
        Self::failing(SourceError::Unavailable("scripted outage".into()))
    }

    pub fn history(mut self, bars: Vec<PriceBar>) -> Self {
        self.history = Ok(bars);
        self
    }

    pub fn quote(mut self, price: f64, previous_close: Option<f64>) -> Self {
        self.quote = Ok((price, previous_close));
        self
    }

    pub fn fundamentals(mut self, metrics: FinancialMetrics) -> Self {
        self.fundamentals = Ok(metrics);
        self
    }

    pub fn news(mut self, items: Vec<NewsItem>) -> Self {
        self.news = Ok(items);
        self
    }

    pub fn company(mut self, info: CompanyInfo) -> Self {
        self.company = Ok(info);
        self
    }

    pub fn earnings(mut self, report: EarningsReport) -> Self {
        self.earnings = Ok(report);
        self
    }
}

pub struct ScriptedSource {
    name: &'static str,
    kind: SourceKind,
    default: TickerScript,
    per_ticker: HashMap<String, TickerScript>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &'static str, kind: SourceKind, default: TickerScript) -> Self {
        Self {
            name,
            kind,
            default,
            per_ticker: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn primary(default: TickerScript) -> Self {
        Self::new("scripted_primary", SourceKind::Primary, default)
    }

    pub fn fallback(default: TickerScript) -> Self {
        Self::new("scripted_fallback", SourceKind::Fallback, default)
    }

    pub fn with_ticker(mut self, ticker: &str, script: TickerScript) -> Self {
        self.per_ticker.insert(ticker.to_ascii_uppercase(), script);
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn script(&self, ticker: &Ticker) -> &TickerScript {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.per_ticker.get(ticker.as_str()).unwrap_or(&self.default)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn get_history(&self, ticker: &Ticker, _lookback_days: u32) -> Result<Vec<PriceBar>, SourceError> {
        self.script(ticker).await.history.clone()
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, SourceError> {
        let (price, previous) = self.script(ticker).await.quote.clone()?;
        Ok(Quote::new(ticker.clone(), price, previous))
    }

    async fn get_fundamentals(&self, ticker: &Ticker) -> Result<FinancialMetrics, SourceError> {
        self.script(ticker).await.fundamentals.clone()
    }

    async fn get_news(&self, ticker: &Ticker, limit: usize) -> Result<Vec<NewsItem>, SourceError> {
        let mut news = self.script(ticker).await.news.clone()?;
        news.truncate(limit);
        Ok(news)
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, SourceError> {
        self.script(ticker).await.company.clone()
    }

    async fn get_earnings(&self, ticker: &Ticker) -> Result<EarningsReport, SourceError> {
        self.script(ticker).await.earnings.clone()
    }
}

/// Daily bars (flat OHLC) for the given closes, one per calendar day ending at `end`
pub fn bars_from_closes(closes: &[f64], end: NaiveDate) -> Vec<PriceBar> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: end - ChronoDuration::days(n - 1 - i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}
