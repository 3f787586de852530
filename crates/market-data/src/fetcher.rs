use analysis_core::{
    AnalysisError, CompanyInfo, EarningsReport, Fetched, FinancialMetrics, MarketDataSource,
    NewsItem, PriceSeries, Provenance, Quote, SourceError, Ticker,
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::synthetic::SyntheticHistory;

pub const SYNTHETIC_SOURCE: &str = "synthetic";
pub const DEFAULT_SYNTHETIC_LENGTH: usize = 250;

/// Position in the per-dataset source chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    TryPrimary,
    TryFallback,
    Synthesize,
    Done,
}

impl FetchState {
    fn next(self) -> Self {
        match self {
            FetchState::TryPrimary => FetchState::TryFallback,
            FetchState::TryFallback => FetchState::Synthesize,
            FetchState::Synthesize | FetchState::Done => FetchState::Done,
        }
    }
}

/// Result of walking the adapters for one dataset
enum Walk<T> {
    Served(Fetched<T>),
    /// Every adapter fell through; carries the reasons
    FellThrough(Vec<String>),
}

/// Sequences Primary → Fallback → Synthetic and tags every result with its provenance.
///
/// Only history is ever synthesized. Fundamentals, news, company info, quotes and
/// earnings either come from a real source or are reported unavailable.
pub struct MarketFetcher {
    primary: Arc<dyn MarketDataSource>,
    fallback: Option<Arc<dyn MarketDataSource>>,
    synthetic: SyntheticHistory,
    synthetic_length: usize,
}

impl MarketFetcher {
    pub fn new(primary: Arc<dyn MarketDataSource>, fallback: Option<Arc<dyn MarketDataSource>>) -> Self {
        Self {
            primary,
            fallback,
            synthetic: SyntheticHistory::ending_today(),
            synthetic_length: DEFAULT_SYNTHETIC_LENGTH,
        }
    }

    pub fn with_synthetic(mut self, synthetic: SyntheticHistory, length: usize) -> Self {
        self.synthetic = synthetic;
        self.synthetic_length = length;
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    async fn walk<T, F, Fut>(
        &self,
        ticker: &Ticker,
        operation: &'static str,
        deadline: Option<Instant>,
        call: F,
    ) -> Result<Walk<T>, AnalysisError>
    where
        F: Fn(Arc<dyn MarketDataSource>) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut state = FetchState::TryPrimary;
        let mut warnings = Vec::new();

        loop {
            let source = match state {
                FetchState::TryPrimary => Some(Arc::clone(&self.primary)),
                FetchState::TryFallback => self.fallback.clone(),
                FetchState::Synthesize | FetchState::Done => return Ok(Walk::FellThrough(warnings)),
            };
            let Some(source) = source else {
                state = state.next();
                continue;
            };

            match bounded(call(Arc::clone(&source)), deadline).await {
                Ok(data) => {
                    let fetched = Fetched::new(data, source.kind().provenance(), source.name());
                    return Ok(Walk::Served(fetched.with_warnings(warnings)));
                }
                Err(err) if err.allows_fallback() => {
                    tracing::warn!(
                        "{} {} from {} failed ({:?} -> {:?}): {}",
                        ticker,
                        operation,
                        source.name(),
                        state,
                        state.next(),
                        err
                    );
                    warnings.push(format!("{} {}: {}", source.name(), operation, err));
                    state = state.next();
                }
                Err(err) => {
                    tracing::warn!("{} {} from {} failed terminally: {}", ticker, operation, source.name(), err);
                    return Err(err.into());
                }
            }
        }
    }

    async fn history_walk(
        &self,
        ticker: &Ticker,
        lookback_days: u32,
        deadline: Option<Instant>,
    ) -> Result<Walk<PriceSeries>, AnalysisError> {
        let walk = self
            .walk(ticker, "history", deadline, |source| {
                let ticker = ticker.clone();
                async move {
                    let bars = source.get_history(&ticker, lookback_days).await?;
                    if bars.is_empty() {
                        return Err(SourceError::Unavailable(format!("{}: no bars", source.name())));
                    }
                    Ok(bars)
                }
            })
            .await?;

        Ok(match walk {
            Walk::Served(fetched) => {
                let provenance = fetched.provenance;
                Walk::Served(fetched.map(|bars| PriceSeries::new(ticker.clone(), bars, provenance)))
            }
            Walk::FellThrough(reasons) => Walk::FellThrough(reasons),
        })
    }

    /// History from a real source only; never synthesized
    pub async fn recorded_history(
        &self,
        ticker: &Ticker,
        lookback_days: u32,
        deadline: Option<Instant>,
    ) -> Result<Fetched<PriceSeries>, AnalysisError> {
        let walk = self.history_walk(ticker, lookback_days, deadline).await?;
        served_or_unavailable(walk, ticker, "history")
    }

    /// Daily history; synthesized when no adapter yields usable bars
    pub async fn history(
        &self,
        ticker: &Ticker,
        lookback_days: u32,
        deadline: Option<Instant>,
    ) -> Result<Fetched<PriceSeries>, AnalysisError> {
        match self.history_walk(ticker, lookback_days, deadline).await? {
            Walk::Served(fetched) => Ok(fetched),
            Walk::FellThrough(mut warnings) => {
                let anchor = match self.quote(ticker, deadline).await {
                    Ok(quote) => Some(quote.data.price),
                    Err(err) => {
                        warnings.push(format!("synthetic anchor: {}", err));
                        None
                    }
                };

                let series = match anchor {
                    Some(price) => self
                        .synthetic
                        .generate_anchored(ticker, self.synthetic_length, price),
                    None => self.synthetic.generate(ticker, self.synthetic_length),
                };
                tracing::warn!(
                    "{}: no source returned history, using {} simulated bars",
                    ticker,
                    series.len()
                );
                warnings.push("history is simulated: no source returned usable bars".to_string());

                Ok(Fetched::new(series, Provenance::Simulated, SYNTHETIC_SOURCE).with_warnings(warnings))
            }
        }
    }

    pub async fn quote(&self, ticker: &Ticker, deadline: Option<Instant>) -> Result<Fetched<Quote>, AnalysisError> {
        let walk = self
            .walk(ticker, "quote", deadline, |source| {
                let ticker = ticker.clone();
                async move { source.get_current_price(&ticker).await }
            })
            .await?;
        served_or_unavailable(walk, ticker, "quote")
    }

    /// Fundamentals; a partial primary answer is completed field by field from the fallback
    pub async fn fundamentals(
        &self,
        ticker: &Ticker,
        deadline: Option<Instant>,
    ) -> Result<Fetched<FinancialMetrics>, AnalysisError> {
        let walk = self
            .walk(ticker, "fundamentals", deadline, |source| {
                let ticker = ticker.clone();
                async move { source.get_fundamentals(&ticker).await }
            })
            .await?;
        let mut fetched = served_or_unavailable(walk, ticker, "fundamentals")?;

        if fetched.provenance == Provenance::Real && !fetched.data.is_complete() {
            if let Some(fallback) = &self.fallback {
                match bounded(fallback.get_fundamentals(ticker), deadline).await {
                    Ok(extra) => {
                        let filled = fetched.data.merge_missing(&extra);
                        if !filled.is_empty() {
                            tracing::info!("{}: filled {:?} from {}", ticker, filled, fallback.name());
                            fetched
                                .warnings
                                .push(format!("{} filled from {}", filled.join(", "), fallback.name()));
                        }
                    }
                    Err(err) => {
                        fetched
                            .warnings
                            .push(format!("{} fundamentals: {}", fallback.name(), err));
                    }
                }
            }
        }

        Ok(fetched)
    }

    pub async fn news(
        &self,
        ticker: &Ticker,
        limit: usize,
        deadline: Option<Instant>,
    ) -> Result<Fetched<Vec<NewsItem>>, AnalysisError> {
        let walk = self
            .walk(ticker, "news", deadline, |source| {
                let ticker = ticker.clone();
                async move { source.get_news(&ticker, limit).await }
            })
            .await?;
        served_or_unavailable(walk, ticker, "news")
    }

    pub async fn company_info(
        &self,
        ticker: &Ticker,
        deadline: Option<Instant>,
    ) -> Result<Fetched<CompanyInfo>, AnalysisError> {
        let walk = self
            .walk(ticker, "company info", deadline, |source| {
                let ticker = ticker.clone();
                async move { source.get_company_info(&ticker).await }
            })
            .await?;
        served_or_unavailable(walk, ticker, "company info")
    }

    pub async fn earnings(
        &self,
        ticker: &Ticker,
        deadline: Option<Instant>,
    ) -> Result<Fetched<EarningsReport>, AnalysisError> {
        let walk = self
            .walk(ticker, "earnings", deadline, |source| {
                let ticker = ticker.clone();
                async move { source.get_earnings(&ticker).await }
            })
            .await?;
        served_or_unavailable(walk, ticker, "earnings")
    }
}

fn served_or_unavailable<T>(walk: Walk<T>, ticker: &Ticker, what: &str) -> Result<Fetched<T>, AnalysisError> {
    match walk {
        Walk::Served(fetched) => Ok(fetched),
        Walk::FellThrough(reasons) => Err(AnalysisError::DataUnavailable(format!(
            "{} for {}: {}",
            what,
            ticker,
            reasons.join("; ")
        ))),
    }
}

/// Bounds one source attempt by the caller's deadline; hitting it counts as a timeout
async fn bounded<T>(
    call: impl Future<Output = Result<T, SourceError>>,
    deadline: Option<Instant>,
) -> Result<T, SourceError> {
    match deadline {
        Some(at) => {
            let budget = at.saturating_duration_since(Instant::now());
            tokio::time::timeout_at(at, call)
                .await
                .unwrap_or(Err(SourceError::Timeout(budget)))
        }
        None => call.await,
    }
}
