use analysis_core::{
    most_recent_news, AnalysisError, CompanyInfo, EarningsRecord, Fetched, FinancialMetrics,
    MarketDataSource, NewsItem, PriceBar, Provenance, Recommendation, Ticker,
};
use chrono::{DateTime, Utc};
use fundamental_analysis::{FundamentalAnalysisEngine, PeValuation};
use market_data::{AlphaVantageSource, MarketFetcher, SyntheticHistory, YahooSource};
use sentiment_analysis::{SentimentAnalysisEngine, SentimentLevel, SentimentSummary};
use serde::Serialize;
use std::sync::Arc;
use technical_analysis::{TechnicalAnalysisEngine, TechnicalReport};
use tokio::time::Instant;

pub mod config;
pub mod opportunity;
pub mod screener;

pub use config::{ScannerConfig, ScoringConfig};
pub use opportunity::{
    rank, technical_score, trend_score, Candidate, Exclusion, OpportunityRecord, OpportunityScorer,
    OpportunityWeights, SentimentSnapshot, SubScores, TechnicalSnapshot,
};
pub use screener::{IndexMembership, ScanFilters, ScanResult, StockScreener};

/// Bars requested when a quote has to be derived from history
const QUOTE_LOOKBACK_DAYS: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct FinalRecommendation {
    /// Sum of the technical, sentiment and valuation directions, -3..=3
    pub score: i32,
    pub recommendation: Recommendation,
    pub factors: Vec<String>,
}

impl FinalRecommendation {
    pub fn combine(technical: Recommendation, sentiment: SentimentLevel, valuation: Option<&PeValuation>) -> Self {
        let mut factors = vec![
            format!("Technical: {} ({:+})", technical, technical.direction()),
            format!("Sentiment: {} ({:+})", sentiment, sentiment.direction()),
        ];
        let valuation_direction = match valuation {
            Some(v) => {
                factors.push(format!(
                    "Valuation: {} at PE {:.2} vs sector {:.2} ({:+})",
                    v.status,
                    v.pe,
                    v.sector_avg_pe,
                    v.status.direction()
                ));
                v.status.direction()
            }
            None => {
                factors.push("Valuation: no PE available (+0)".to_string());
                0
            }
        };

        let score = technical.direction() + sentiment.direction() + valuation_direction;
        Self {
            score,
            recommendation: Recommendation::from_score(score),
            factors,
        }
    }
}

/// Which datasets were served, and by what path
#[derive(Debug, Clone, Serialize)]
pub struct DataAvailability {
    pub history: Provenance,
    pub history_source: String,
    pub fundamentals: Option<Provenance>,
    pub news: Option<Provenance>,
    pub company_info: Option<Provenance>,
    pub quote: Option<Provenance>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub ticker: Ticker,
    pub company_name: Option<String>,
    pub current_price: f64,
    pub price_change: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub provenance: Provenance,
    pub price_history: Vec<PriceBar>,
    pub technical: TechnicalReport,
    pub technical_recommendation: Recommendation,
    pub fundamentals: Option<FinancialMetrics>,
    pub valuation: Option<PeValuation>,
    pub sentiment: SentimentSummary,
    pub headlines: Vec<NewsItem>,
    pub final_recommendation: FinalRecommendation,
    pub data_availability: DataAvailability,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteResult {
    pub ticker: Ticker,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub provenance: Provenance,
    pub source: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EarningsResult {
    pub ticker: Ticker,
    pub summary: CompanyInfo,
    pub annual: Vec<EarningsRecord>,
    pub quarterly: Vec<EarningsRecord>,
    pub provenance: Provenance,
    pub source: String,
    pub warnings: Vec<String>,
}

/// Optional dataset: its warnings are kept, a failure degrades to a warning
fn degrade<T>(what: &str, result: Result<Fetched<T>, AnalysisError>, warnings: &mut Vec<String>) -> Option<Fetched<T>> {
    match result {
        Ok(fetched) => {
            warnings.extend(fetched.warnings.iter().cloned());
            Some(fetched)
        }
        Err(err) => {
            warnings.push(format!("{} unavailable: {}", what, err));
            None
        }
    }
}

pub struct AnalysisOrchestrator {
    fetcher: MarketFetcher,
    technical: TechnicalAnalysisEngine,
    sentiment: SentimentAnalysisEngine,
    scorer: OpportunityScorer,
    config: ScannerConfig,
}

impl AnalysisOrchestrator {
    /// Wires the live sources; Alpha Vantage joins as fallback only when a key is set
    pub fn from_config(config: ScannerConfig) -> Result<Self, AnalysisError> {
        let gate = config.rate_gate();
        let retry = config.retry_policy();

        let primary: Arc<dyn MarketDataSource> = Arc::new(YahooSource::new(
            Arc::clone(&gate),
            retry.clone(),
            config.http_timeout,
        )?);
        let fallback: Option<Arc<dyn MarketDataSource>> = match &config.alpha_vantage_api_key {
            Some(key) => Some(Arc::new(AlphaVantageSource::new(
                key.clone(),
                gate,
                retry,
                config.http_timeout,
            )?)),
            None => {
                tracing::warn!("ALPHA_VANTAGE_API_KEY not set, running without a fallback source");
                None
            }
        };

        let fetcher = MarketFetcher::new(primary, fallback)
            .with_synthetic(SyntheticHistory::ending_today(), config.synthetic_length);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: ScannerConfig, fetcher: MarketFetcher) -> Self {
        let scorer = OpportunityScorer::new(
            FundamentalAnalysisEngine::new(config.scoring.pe_table.clone()),
            config.scoring.weights,
        );
        Self {
            fetcher,
            technical: TechnicalAnalysisEngine::new(),
            sentiment: SentimentAnalysisEngine::new(),
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn scorer(&self) -> &OpportunityScorer {
        &self.scorer
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.ticker_timeout
    }

    /// Full single-ticker report. Only an invalid or unknown ticker, or a terminal
    /// history failure, aborts; every other gap degrades with a warning.
    pub async fn analyze(&self, raw_ticker: &str) -> Result<AnalysisReport, AnalysisError> {
        let ticker = Ticker::parse(raw_ticker)?;
        tracing::info!("Starting analysis for {}", ticker);
        let deadline = Some(self.deadline());

        let (history, fundamentals, news, company, quote) = tokio::join!(
            self.fetcher.history(&ticker, self.config.history_lookback_days, deadline),
            self.fetcher.fundamentals(&ticker, deadline),
            self.fetcher.news(&ticker, self.config.news_limit, deadline),
            self.fetcher.company_info(&ticker, deadline),
            self.fetcher.quote(&ticker, deadline),
        );

        let history = history?;
        let mut warnings = history.warnings.clone();
        let fundamentals = degrade("fundamentals", fundamentals, &mut warnings);
        let news = degrade("news", news, &mut warnings);
        let company = degrade("company info", company, &mut warnings);
        let quote = degrade("quote", quote, &mut warnings);

        let series = &history.data;
        let technical = self.technical.analyze(series);
        warnings.extend(technical.insufficient().iter().map(|e| e.to_string()));

        let metrics = fundamentals.as_ref().map(|f| {
            let mut metrics = f.data.clone();
            if let Some(info) = company.as_ref().map(|c| &c.data) {
                metrics.sector = metrics.sector.take().or_else(|| info.sector.clone());
                metrics.industry = metrics.industry.take().or_else(|| info.industry.clone());
                metrics.market_cap = metrics.market_cap.or(info.market_cap);
            }
            metrics
        });
        let valuation = metrics.as_ref().and_then(|m| self.scorer.fundamentals().pe_valuation(m));

        let news_items = news.as_ref().map(|n| n.data.clone()).unwrap_or_default();
        let sentiment = self.sentiment.analyze(&news_items);
        let headlines = most_recent_news(news_items, self.config.headline_limit);

        let bar_change = series.last_change();
        let (current_price, price_change, price_change_percent) = match quote.as_ref().map(|q| &q.data) {
            Some(q) => (
                q.price,
                q.change.or(bar_change.map(|(c, _)| c)),
                q.change_percent.or(bar_change.map(|(_, p)| p)),
            ),
            None => {
                let price = series.last_close().ok_or_else(|| {
                    AnalysisError::DataUnavailable(format!("no price for {}", ticker))
                })?;
                (price, bar_change.map(|(c, _)| c), bar_change.map(|(_, p)| p))
            }
        };

        let technical_recommendation = technical.composite.recommendation;
        let final_recommendation =
            FinalRecommendation::combine(technical_recommendation, sentiment.level, valuation.as_ref());

        tracing::info!(
            "Analysis complete for {}: {} history from {}, composite {}, final {}",
            ticker,
            history.provenance.as_str(),
            history.source,
            technical.composite.score,
            final_recommendation.recommendation
        );

        Ok(AnalysisReport {
            company_name: company.as_ref().and_then(|c| c.data.name.clone()),
            current_price,
            price_change,
            price_change_percent,
            provenance: history.provenance,
            price_history: series.tail(self.config.price_history_points).to_vec(),
            technical_recommendation,
            valuation,
            sentiment,
            headlines,
            final_recommendation,
            data_availability: DataAvailability {
                history: history.provenance,
                history_source: history.source.clone(),
                fundamentals: fundamentals.as_ref().map(|f| f.provenance),
                news: news.as_ref().map(|n| n.provenance),
                company_info: company.as_ref().map(|c| c.provenance),
                quote: quote.as_ref().map(|q| q.provenance),
                warnings,
            },
            technical,
            fundamentals: metrics,
            generated_at: Utc::now(),
            ticker,
        })
    }

    /// Current price without indicators. With no quote anywhere, the last two
    /// recorded bars stand in; simulated history never does.
    pub async fn quote(&self, raw_ticker: &str) -> Result<QuoteResult, AnalysisError> {
        let ticker = Ticker::parse(raw_ticker)?;
        let deadline = Some(self.deadline());

        let reason = match self.fetcher.quote(&ticker, deadline).await {
            Ok(fetched) => {
                return Ok(QuoteResult {
                    price: fetched.data.price,
                    change: fetched.data.change,
                    change_percent: fetched.data.change_percent,
                    provenance: fetched.provenance,
                    source: fetched.source,
                    warnings: fetched.warnings,
                    ticker,
                })
            }
            Err(AnalysisError::DataUnavailable(reason)) => reason,
            Err(err) => return Err(err),
        };

        tracing::warn!("{}: no quote available, deriving from recorded history", ticker);
        let history = self
            .fetcher
            .recorded_history(&ticker, QUOTE_LOOKBACK_DAYS, deadline)
            .await
            .map_err(|err| match err {
                AnalysisError::DataUnavailable(more) => {
                    AnalysisError::DataUnavailable(format!("{}; {}", reason, more))
                }
                other => other,
            })?;

        let price = history
            .data
            .last_close()
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("no price for {}", ticker)))?;
        let change = history.data.last_change();
        let mut warnings = history.warnings;
        warnings.push(format!("price derived from history: {}", reason));

        Ok(QuoteResult {
            ticker,
            price,
            change: change.map(|(c, _)| c),
            change_percent: change.map(|(_, p)| p),
            provenance: history.provenance,
            source: history.source,
            warnings,
        })
    }

    /// Income statements with a company summary. Missing company info only warns.
    pub async fn earnings(&self, raw_ticker: &str) -> Result<EarningsResult, AnalysisError> {
        let ticker = Ticker::parse(raw_ticker)?;
        let deadline = Some(self.deadline());

        let (earnings, company) = tokio::join!(
            self.fetcher.earnings(&ticker, deadline),
            self.fetcher.company_info(&ticker, deadline),
        );
        let earnings = earnings?;
        let mut warnings = earnings.warnings;
        let summary = degrade("company info", company, &mut warnings)
            .map(|c| c.data)
            .unwrap_or_default();
        if earnings.data.is_empty() {
            warnings.push(format!("{} reported no income statements", earnings.source));
        }

        Ok(EarningsResult {
            ticker,
            summary,
            annual: earnings.data.annual,
            quarterly: earnings.data.quarterly,
            provenance: earnings.provenance,
            source: earnings.source,
            warnings,
        })
    }

    /// History, fundamentals, quote and headline sentiment for one scan candidate
    pub(crate) async fn gather_candidate(&self, ticker: &Ticker) -> Result<Candidate, AnalysisError> {
        let deadline = Some(self.deadline());
        let news_limit = self.config.scan_news_limit;
        let news = async {
            if news_limit == 0 {
                return None;
            }
            Some(self.fetcher.news(ticker, news_limit, deadline).await)
        };
        let (history, fundamentals, quote, news) = tokio::join!(
            self.fetcher.history(ticker, self.config.history_lookback_days, deadline),
            self.fetcher.fundamentals(ticker, deadline),
            self.fetcher.quote(ticker, deadline),
            news,
        );

        let history = history?;
        let mut warnings = Vec::new();
        let metrics = degrade("fundamentals", fundamentals, &mut warnings)
            .map(|f| f.data)
            .unwrap_or_default();
        let price = match degrade("quote", quote, &mut warnings) {
            Some(q) => Some(q.data.price),
            None if history.provenance != Provenance::Simulated => history.data.last_close(),
            None => None,
        };
        let sentiment = news
            .and_then(|result| degrade("news", result, &mut warnings))
            .map(|n| SentimentSnapshot::from(&self.sentiment.analyze(&n.data)))
            .unwrap_or_else(SentimentSnapshot::neutral);
        for warning in warnings.iter().chain(&history.warnings) {
            tracing::debug!("{}: {}", ticker, warning);
        }

        Ok(Candidate {
            ticker: ticker.clone(),
            price,
            metrics,
            technical: self.technical.analyze(&history.data),
            sentiment,
            provenance: history.provenance,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{end, orchestrator};
    use super::*;
    use analysis_core::{EarningsPeriod, EarningsReport, SourceError};
    use chrono::TimeZone;
    use fundamental_analysis::PeStatus;
    use market_data::mock::{bars_from_closes, ScriptedSource, TickerScript};
    use tokio_test::{assert_err, assert_ok};

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn headline(title: &str, day: u32) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            description: None,
            publisher: Some("Wire".into()),
            published_at: Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).single(),
        }
    }

    fn tech_metrics(pe: f64) -> FinancialMetrics {
        FinancialMetrics {
            pe_ratio: Some(pe),
            peg_ratio: Some(1.2),
            ..Default::default()
        }
    }

    #[test]
    fn test_final_recommendation_sums_directions() {
        let cheap = PeValuation::assess(14.0, 28.5);
        let result = FinalRecommendation::combine(Recommendation::Buy, SentimentLevel::VeryPositive, Some(&cheap));
        assert_eq!(result.score, 3);
        assert_eq!(result.recommendation, Recommendation::StrongBuy);
        assert_eq!(result.factors.len(), 3);

        let pricey = PeValuation::assess(40.0, 20.0);
        let result = FinalRecommendation::combine(Recommendation::StrongSell, SentimentLevel::Neutral, Some(&pricey));
        assert_eq!(result.score, -2);
        assert_eq!(result.recommendation, Recommendation::Sell);

        let result = FinalRecommendation::combine(Recommendation::Neutral, SentimentLevel::Negative, None);
        assert_eq!(result.score, -1);
        assert_eq!(result.recommendation, Recommendation::Neutral);
        assert!(result.factors[2].contains("no PE"));
    }

    #[tokio::test]
    async fn test_analyze_with_primary_data() {
        let news: Vec<NewsItem> = (1..=8).map(|d| headline("Apple beats estimates", d)).collect();
        let script = TickerScript::unavailable()
            .history(bars_from_closes(&rising(250), end()))
            .quote(349.5, Some(349.0))
            .fundamentals(tech_metrics(14.25))
            .news(news)
            .company(CompanyInfo {
                name: Some("Apple Inc.".into()),
                sector: Some("Technology".into()),
                industry: Some("Consumer Electronics".into()),
                market_cap: Some(3.0e12),
                currency: Some("USD".into()),
            });

        let report = assert_ok!(orchestrator(ScriptedSource::primary(script), None).analyze("aapl").await);

        assert_eq!(report.ticker.as_str(), "AAPL");
        assert_eq!(report.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(report.provenance, Provenance::Real);
        assert_eq!(report.current_price, 349.5);
        assert_eq!(report.price_change, Some(0.5));
        assert_eq!(report.price_history.len(), 90);
        assert_eq!(report.price_history.last().map(|b| b.date), Some(end()));
        assert_eq!(report.headlines.len(), 5);
        assert_eq!(report.sentiment.news_count, 8);

        let metrics = report.fundamentals.as_ref().unwrap();
        assert_eq!(metrics.sector.as_deref(), Some("Technology"));
        let valuation = report.valuation.as_ref().unwrap();
        assert_eq!(valuation.sector_avg_pe, 28.5);
        assert_eq!(valuation.status, PeStatus::Undervalued);

        let expected = report.technical_recommendation.direction() + report.sentiment.level.direction() + 1;
        assert_eq!(report.final_recommendation.score, expected);
        assert_eq!(report.data_availability.fundamentals, Some(Provenance::Real));
        assert_eq!(report.data_availability.history_source, "scripted_primary");
    }

    #[tokio::test]
    async fn test_analyze_degrades_when_sources_are_down() {
        let report = assert_ok!(
            orchestrator(ScriptedSource::primary(TickerScript::unavailable()), None)
                .analyze("MSFT")
                .await
        );

        assert_eq!(report.provenance, Provenance::Simulated);
        assert_eq!(report.data_availability.history_source, market_data::SYNTHETIC_SOURCE);
        assert!(report.fundamentals.is_none());
        assert!(report.valuation.is_none());
        assert_eq!(report.sentiment.news_count, 0);
        assert_eq!(report.sentiment.level, SentimentLevel::Neutral);
        assert!(report.headlines.is_empty());
        assert_eq!(report.data_availability.quote, None);
        assert!(report.price_change.is_some());
        assert!(report
            .data_availability
            .warnings
            .iter()
            .any(|w| w.contains("history is simulated")));
        assert!(report
            .data_availability
            .warnings
            .iter()
            .any(|w| w.starts_with("fundamentals unavailable")));
    }

    #[tokio::test]
    async fn test_short_history_reports_insufficient_data() {
        let script = TickerScript::unavailable().history(bars_from_closes(&rising(30), end()));
        let report = assert_ok!(orchestrator(ScriptedSource::primary(script), None).analyze("IBM").await);

        assert_eq!(report.provenance, Provenance::Real);
        assert_eq!(report.current_price, 129.0);
        assert!(report
            .data_availability
            .warnings
            .iter()
            .any(|w| w.contains("SMA Cross")));
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_ticker() {
        let orch = orchestrator(ScriptedSource::primary(TickerScript::unavailable()), None);
        assert!(matches!(assert_err!(orch.analyze("  ").await), AnalysisError::InvalidInput(_)));
        assert!(matches!(assert_err!(orch.analyze("AA PL").await), AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_analyze_unknown_ticker() {
        let primary = ScriptedSource::primary(TickerScript::failing(SourceError::NotFound("ZZZZ".into())));
        let err = assert_err!(orchestrator(primary, None).analyze("ZZZZ").await);
        assert_eq!(err, AnalysisError::UnknownTicker("ZZZZ".into()));
    }

    #[tokio::test]
    async fn test_quote_from_source() {
        let primary = ScriptedSource::primary(TickerScript::unavailable().quote(200.0, Some(160.0)));
        let quote = assert_ok!(orchestrator(primary, None).quote("nvda").await);
        assert_eq!(quote.price, 200.0);
        assert_eq!(quote.change, Some(40.0));
        assert_eq!(quote.change_percent, Some(25.0));
        assert_eq!(quote.provenance, Provenance::Real);
    }

    #[tokio::test]
    async fn test_quote_derived_from_fallback_history() {
        let primary = ScriptedSource::primary(TickerScript::unavailable());
        let fallback =
            ScriptedSource::fallback(TickerScript::unavailable().history(bars_from_closes(&[100.0, 80.0, 100.0], end())));
        let quote = assert_ok!(orchestrator(primary, Some(fallback)).quote("KO").await);

        assert_eq!(quote.price, 100.0);
        assert_eq!(quote.change, Some(20.0));
        assert_eq!(quote.change_percent, Some(25.0));
        assert_eq!(quote.provenance, Provenance::Fallback);
        assert!(quote.warnings.iter().any(|w| w.starts_with("price derived from history")));
    }

    #[tokio::test]
    async fn test_quote_never_simulated() {
        let err = assert_err!(
            orchestrator(ScriptedSource::primary(TickerScript::unavailable()), None)
                .quote("KO")
                .await
        );
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_earnings_with_summary() {
        let record = EarningsRecord::new(
            end(),
            EarningsPeriod::Annual,
            Some(1000.0),
            Some(400.0),
            Some(250.0),
            Some(200.0),
        );
        let report = EarningsReport {
            annual: vec![record],
            quarterly: Vec::new(),
        };
        let primary = ScriptedSource::primary(TickerScript::unavailable().earnings(report));
        let result = assert_ok!(orchestrator(primary, None).earnings("AAPL").await);

        assert_eq!(result.annual.len(), 1);
        assert_eq!(result.annual[0].gross_margin, Some(40.0));
        assert_eq!(result.summary, CompanyInfo::default());
        assert!(result.warnings.iter().any(|w| w.starts_with("company info unavailable")));
    }

    #[tokio::test]
    async fn test_earnings_unavailable_without_primary() {
        let primary = ScriptedSource::primary(TickerScript::unavailable());
        let fallback = ScriptedSource::fallback(TickerScript::failing(SourceError::Unsupported {
            source_name: "scripted_fallback".into(),
            operation: "earnings history",
        }));
        let err = assert_err!(orchestrator(primary, Some(fallback)).earnings("AAPL").await);
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }
}
