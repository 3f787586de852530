use super::AnalysisOrchestrator;
use crate::opportunity::{rank, Candidate, OpportunityRecord};
use analysis_core::{AnalysisError, Recommendation, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Large-cap subset of the S&P 500
const SP500: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "META", "GOOGL", "BRK-B", "LLY", "AVGO", "JPM", "TSLA", "UNH",
    "XOM", "V", "JNJ", "PG", "MA", "HD", "COST", "ABBV", "MRK", "CVX", "WMT", "KO", "PEP", "BAC",
    "ADBE", "CRM", "NFLX", "TMO", "ACN", "MCD", "CSCO", "ABT", "LIN", "ORCL", "WFC", "DHR", "DIS",
    "AMD", "TXN", "PM", "CAT", "VZ", "INTU", "IBM", "QCOM", "AMGN", "GE", "NEE", "HON", "UNP",
    "LOW", "SPGI", "GS", "RTX", "BLK", "ELV", "PFE", "NKE",
];

const NASDAQ100: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "META", "GOOGL", "GOOG", "AVGO", "TSLA", "COST", "NFLX", "AMD",
    "PEP", "ADBE", "CSCO", "TMUS", "QCOM", "INTU", "TXN", "AMGN", "ISRG", "CMCSA", "AMAT", "BKNG",
    "HON", "VRTX", "ADP", "PANW", "MU", "ADI", "GILD", "SBUX", "LRCX", "MELI", "INTC", "MDLZ",
    "KLAC", "REGN", "CDNS", "SNPS", "PYPL", "CRWD", "MAR", "ORLY", "CTAS", "ABNB", "ASML", "FTNT",
    "MRVL", "CSX",
];

const DOW30: &[&str] = &[
    "AAPL", "AMGN", "AMZN", "AXP", "BA", "CAT", "CRM", "CSCO", "CVX", "DIS", "GS", "HD", "HON",
    "IBM", "JNJ", "JPM", "KO", "MCD", "MMM", "MRK", "MSFT", "NKE", "NVDA", "PG", "SHW", "TRV",
    "UNH", "V", "VZ", "WMT",
];

/// Market-cap band used by the last relaxation step
const LARGE_CAP_MIN: f64 = 10e9;
const LARGE_CAP_MAX: f64 = 200e9;
const RELAXED_MAX_PE: f64 = 30.0;
const LAST_RELAXATION_STEP: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMembership {
    #[default]
    Sp500,
    Nasdaq100,
    Dow30,
}

impl IndexMembership {
    pub const ALL: [IndexMembership; 3] = [
        IndexMembership::Sp500,
        IndexMembership::Nasdaq100,
        IndexMembership::Dow30,
    ];

    pub fn constituents(&self) -> &'static [&'static str] {
        match self {
            IndexMembership::Sp500 => SP500,
            IndexMembership::Nasdaq100 => NASDAQ100,
            IndexMembership::Dow30 => DOW30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMembership::Sp500 => "sp500",
            IndexMembership::Nasdaq100 => "nasdaq100",
            IndexMembership::Dow30 => "dow30",
        }
    }
}

impl fmt::Display for IndexMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexMembership {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sp500" | "s&p500" | "spx" => Ok(IndexMembership::Sp500),
            "nasdaq100" | "nasdaq" | "ndx" => Ok(IndexMembership::Nasdaq100),
            "dow30" | "dow" | "djia" => Ok(IndexMembership::Dow30),
            other => Err(AnalysisError::InvalidInput(format!(
                "unknown index '{}', expected sp500, nasdaq100 or dow30",
                other
            ))),
        }
    }
}

fn parse_unique(symbols: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Vec<Ticker>, AnalysisError> {
    let set: BTreeSet<Ticker> = symbols
        .into_iter()
        .map(|s| Ticker::parse(s.as_ref()))
        .collect::<Result<_, _>>()?;
    Ok(set.into_iter().collect())
}

/// `0 < value < max` when a bound is set; a missing value never passes a bound
fn under(value: Option<f64>, max: Option<f64>) -> bool {
    match max {
        None => true,
        Some(max) => value.map(|v| v > 0.0 && v < max).unwrap_or(false),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilters {
    pub index: IndexMembership,
    /// Custom universe; replaces the index constituents when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickers: Option<Vec<String>>,
    pub max_pe: Option<f64>,
    pub max_peg: Option<f64>,
    pub above_sma20: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_market_cap: Option<f64>,
    pub limit: usize,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self {
            index: IndexMembership::Sp500,
            tickers: None,
            max_pe: Some(25.0),
            max_peg: Some(1.0),
            above_sma20: true,
            min_market_cap: None,
            max_market_cap: None,
            limit: 10,
        }
    }
}

impl ScanFilters {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.limit == 0 {
            return Err(AnalysisError::InvalidInput("limit must be at least 1".to_string()));
        }
        let bounds = [
            ("max_pe", self.max_pe),
            ("max_peg", self.max_peg),
            ("min_market_cap", self.min_market_cap),
            ("max_market_cap", self.max_market_cap),
        ];
        for (name, bound) in bounds {
            if let Some(v) = bound {
                if !(v.is_finite() && v > 0.0) {
                    return Err(AnalysisError::InvalidInput(format!("{} must be positive, got {}", name, v)));
                }
            }
        }
        self.universe().map(|_| ())
    }

    /// Tickers to evaluate: the custom list when given, else the index constituents
    pub fn universe(&self) -> Result<Vec<Ticker>, AnalysisError> {
        match &self.tickers {
            Some(list) if list.is_empty() => Err(AnalysisError::InvalidInput(
                "ticker list must not be empty".to_string(),
            )),
            Some(list) => parse_unique(list),
            None => parse_unique(self.index.constituents()),
        }
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        let metrics = &candidate.metrics;
        if !under(metrics.pe_ratio, self.max_pe) || !under(metrics.peg_ratio, self.max_peg) {
            return false;
        }
        if self.above_sma20 && !candidate.technical.trend.map(|t| t.above_sma20).unwrap_or(false) {
            return false;
        }
        if let Some(min) = self.min_market_cap {
            if !metrics.market_cap.map(|cap| cap >= min).unwrap_or(false) {
                return false;
            }
        }
        if let Some(max) = self.max_market_cap {
            if !metrics.market_cap.map(|cap| cap <= max).unwrap_or(false) {
                return false;
            }
        }
        true
    }

    /// Filter set for relaxation `step` (1..=3); index, custom list and limit carry over
    pub fn relaxed(&self, step: u8) -> Self {
        let unfiltered = Self {
            max_pe: None,
            max_peg: None,
            above_sma20: false,
            min_market_cap: None,
            max_market_cap: None,
            ..self.clone()
        };
        match step {
            1 => Self {
                max_pe: Some(RELAXED_MAX_PE),
                ..unfiltered
            },
            2 => unfiltered,
            _ => Self {
                tickers: None,
                min_market_cap: Some(LARGE_CAP_MIN),
                max_market_cap: Some(LARGE_CAP_MAX),
                ..unfiltered
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub records: Vec<OpportunityRecord>,
    pub sector_distribution: BTreeMap<String, usize>,
    pub signal_distribution: BTreeMap<Recommendation, usize>,
    pub scanned: usize,
    pub matched: usize,
    pub excluded: usize,
    pub failed: usize,
    pub requested_filters: ScanFilters,
    pub filters_applied: ScanFilters,
    pub relaxation_step: Option<u8>,
    pub warnings: Vec<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

struct Selection {
    records: Vec<OpportunityRecord>,
    matched: usize,
    excluded: usize,
}

pub struct StockScreener {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl StockScreener {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn screen(&self, filters: ScanFilters) -> Result<ScanResult, AnalysisError> {
        filters.validate()?;
        let universe = filters.universe()?;
        tracing::info!("Starting scan of {} tickers ({})", universe.len(), filters.index);

        let mut warnings = Vec::new();
        let mut scanned = universe.len();
        let (mut pool, mut failed) = self.evaluate(universe, &mut warnings).await;

        let mut applied = filters.clone();
        let mut relaxation_step = None;
        let mut selection = self.select(&pool, &filters);

        if selection.records.is_empty() {
            for step in 1..=LAST_RELAXATION_STEP {
                let relaxed = filters.relaxed(step);
                if step == LAST_RELAXATION_STEP {
                    let seen: BTreeSet<Ticker> = pool.iter().map(|c| c.ticker.clone()).collect();
                    let extra: Vec<Ticker> = parse_unique(
                        IndexMembership::ALL.iter().flat_map(|i| i.constituents().iter()),
                    )?
                    .into_iter()
                    .filter(|t| !seen.contains(t))
                    .collect();
                    scanned += extra.len();
                    let (more, more_failed) = self.evaluate(extra, &mut warnings).await;
                    pool.extend(more);
                    failed += more_failed;
                }

                let attempt = self.select(&pool, &relaxed);
                if !attempt.records.is_empty() {
                    tracing::info!("No matches for requested filters, relaxed to step {}", step);
                    warnings.push(format!("no candidates matched the requested filters; relaxed to step {}", step));
                    selection = attempt;
                    applied = relaxed;
                    relaxation_step = Some(step);
                    break;
                }
            }
            if relaxation_step.is_none() {
                warnings.push("no candidates matched, even with every filter relaxed".to_string());
            }
        }

        let mut sector_distribution = BTreeMap::new();
        let mut signal_distribution = BTreeMap::new();
        for record in &selection.records {
            let sector = record.sector.clone().unwrap_or_else(|| "Unknown".to_string());
            *sector_distribution.entry(sector).or_insert(0) += 1;
            *signal_distribution
                .entry(record.technical.composite.recommendation)
                .or_insert(0) += 1;
        }

        tracing::info!(
            "Scan complete: {} scanned, {} matched, {} excluded, {} failed, returning {}",
            scanned,
            selection.matched,
            selection.excluded,
            failed,
            selection.records.len()
        );

        Ok(ScanResult {
            records: selection.records,
            sector_distribution,
            signal_distribution,
            scanned,
            matched: selection.matched,
            excluded: selection.excluded,
            failed,
            requested_filters: filters,
            filters_applied: applied,
            relaxation_step,
            warnings,
            generated_at: chrono::Utc::now(),
        })
    }

    /// Gathers candidates on a worker pool bounded by `scan_concurrency`
    async fn evaluate(&self, tickers: Vec<Ticker>, warnings: &mut Vec<String>) -> (Vec<Candidate>, usize) {
        let permits = Arc::new(Semaphore::new(self.orchestrator.config().scan_concurrency));
        let mut tasks = JoinSet::new();

        for ticker in tickers {
            let orchestrator = Arc::clone(&self.orchestrator);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = orchestrator.gather_candidate(&ticker).await;
                (ticker, result)
            });
        }

        let mut candidates = Vec::new();
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(candidate))) => candidates.push(candidate),
                Ok((ticker, Err(e))) => {
                    tracing::warn!("Failed to evaluate {}: {}", ticker, e);
                    warnings.push(format!("{}: {}", ticker, e));
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!("Scan task error: {}", e);
                    failed += 1;
                }
            }
        }

        candidates.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        (candidates, failed)
    }

    fn select(&self, pool: &[Candidate], filters: &ScanFilters) -> Selection {
        let scorer = self.orchestrator.scorer();
        let mut records = Vec::new();
        let mut matched = 0;
        let mut excluded = 0;

        for candidate in pool.iter().filter(|c| filters.matches(c)) {
            matched += 1;
            match scorer.score(candidate) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::debug!("{} excluded: {}", candidate.ticker, reason);
                    excluded += 1;
                }
            }
        }

        Selection {
            records: rank(records, filters.limit),
            matched,
            excluded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{end, orchestrator};
    use analysis_core::{FinancialMetrics, NewsItem, SourceError};
    use market_data::mock::{bars_from_closes, ScriptedSource, TickerScript};
    use sentiment_analysis::SentimentLevel;
    use tokio_test::{assert_err, assert_ok};

    fn stock(pe: f64, peg: f64, sector: &str, market_cap: f64, closes: &[f64]) -> TickerScript {
        TickerScript::unavailable()
            .history(bars_from_closes(closes, end()))
            .fundamentals(FinancialMetrics {
                pe_ratio: Some(pe),
                peg_ratio: Some(peg),
                market_cap: Some(market_cap),
                sector: Some(sector.to_string()),
                ..Default::default()
            })
    }

    fn rising() -> Vec<f64> {
        (0..250).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    fn falling() -> Vec<f64> {
        let mut closes = vec![100.0; 40];
        closes.extend((0..10).map(|i| 95.0 - i as f64));
        closes
    }

    fn screener(primary: ScriptedSource) -> StockScreener {
        StockScreener::new(Arc::new(orchestrator(primary, None)))
    }

    fn custom(tickers: &[&str]) -> ScanFilters {
        ScanFilters {
            tickers: Some(tickers.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    fn source() -> ScriptedSource {
        ScriptedSource::primary(TickerScript::unavailable())
            .with_ticker("GOOD", stock(14.0, 0.4, "Technology", 50e9, &[100.0; 250]))
            .with_ticker("FAIR", stock(28.5, 1.5, "Technology", 80e9, &[100.0; 250]))
            .with_ticker("BAD", stock(999.0, 5.0, "Unknown", 20e9, &falling()))
            .with_ticker("RISE", stock(14.0, 0.5, "Industrials", 30e9, &rising()))
    }

    #[tokio::test]
    async fn test_expensive_falling_stock_ranks_last() {
        let filters = ScanFilters {
            max_pe: None,
            max_peg: None,
            above_sma20: false,
            ..custom(&["GOOD", "FAIR", "BAD"])
        };
        let result = assert_ok!(screener(source()).screen(filters).await);

        let order: Vec<&str> = result.records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["GOOD", "FAIR", "BAD"]);
        assert_eq!(result.scanned, 3);
        assert_eq!(result.matched, 3);
        assert_eq!(result.excluded, 0);
        assert_eq!(result.relaxation_step, None);
        assert_eq!(result.sector_distribution.get("Technology"), Some(&2));
        assert_eq!(result.signal_distribution.values().sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn test_default_filters() {
        let result = assert_ok!(screener(source()).screen(custom(&["GOOD", "FAIR", "BAD", "RISE"])).await);

        // only RISE is cheap, low-PEG and above its SMA20
        assert_eq!(result.matched, 1);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].ticker.as_str(), "RISE");
        assert_eq!(result.records[0].price, 224.5);
        assert_eq!(result.relaxation_step, None);
        assert_eq!(result.filters_applied, result.requested_filters);
    }

    #[tokio::test]
    async fn test_relaxes_to_step_one() {
        let filters = ScanFilters {
            max_pe: Some(10.0),
            ..custom(&["GOOD", "FAIR"])
        };
        let result = assert_ok!(screener(source()).screen(filters).await);

        assert_eq!(result.relaxation_step, Some(1));
        assert_eq!(result.filters_applied.max_pe, Some(30.0));
        assert_eq!(result.filters_applied.max_peg, None);
        assert!(!result.filters_applied.above_sma20);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.requested_filters.max_pe, Some(10.0));
    }

    #[tokio::test]
    async fn test_relaxes_to_large_caps_across_indices() {
        let primary = ScriptedSource::primary(stock(15.0, 1.0, "Industrials", 50e9, &[100.0; 250])).with_ticker(
            "TINY",
            TickerScript::unavailable().history(bars_from_closes(&[10.0; 250], end())),
        );
        let filters = ScanFilters {
            limit: 5,
            ..custom(&["TINY"])
        };
        let result = assert_ok!(screener(primary).screen(filters).await);

        assert_eq!(result.relaxation_step, Some(3));
        assert_eq!(result.records.len(), 5);
        assert!(result.scanned > DOW30.len());
        assert_eq!(result.filters_applied.min_market_cap, Some(10e9));
        assert!(result.filters_applied.tickers.is_none());

        // identical scores tie-break on ticker
        let tickers: Vec<&str> = result.records.iter().map(|r| r.ticker.as_str()).collect();
        let mut sorted = tickers.clone();
        sorted.sort();
        assert_eq!(tickers, sorted);
        assert!(!tickers.contains(&"TINY"));
    }

    #[tokio::test]
    async fn test_records_carry_headline_sentiment() {
        let headlines: Vec<NewsItem> = (0..5)
            .map(|i| NewsItem {
                title: format!("Shares plunge after earnings miss, part {}", i),
                description: None,
                publisher: None,
                published_at: None,
            })
            .collect();
        let primary = source().with_ticker(
            "SLIP",
            stock(14.0, 0.4, "Technology", 50e9, &[100.0; 250]).news(headlines),
        );
        let filters = ScanFilters {
            max_pe: None,
            max_peg: None,
            above_sma20: false,
            ..custom(&["GOOD", "SLIP"])
        };
        let result = assert_ok!(screener(primary).screen(filters).await);

        let slip = result.records.iter().find(|r| r.ticker.as_str() == "SLIP").unwrap();
        assert_eq!(slip.sentiment.level, SentimentLevel::VeryNegative);
        assert_eq!(slip.sentiment.news_count, 3);
        assert!(slip.sentiment.average_polarity < -0.5);

        // no headlines: neutral, and the score is unaffected
        let good = result.records.iter().find(|r| r.ticker.as_str() == "GOOD").unwrap();
        assert_eq!(good.sentiment.level, SentimentLevel::Neutral);
        assert_eq!(good.sentiment.news_count, 0);
        assert_eq!(good.opportunity_score, slip.opportunity_score);
    }

    #[tokio::test]
    async fn test_missing_inputs_are_excluded_not_fatal() {
        let primary = source()
            .with_ticker("NOPE", TickerScript::unavailable().history(bars_from_closes(&[50.0; 60], end())))
            .with_ticker("GONE", TickerScript::failing(SourceError::NotFound("GONE".into())));
        let filters = ScanFilters {
            max_pe: None,
            max_peg: None,
            above_sma20: false,
            ..custom(&["GOOD", "NOPE", "GONE"])
        };
        let result = assert_ok!(screener(primary).screen(filters).await);

        assert_eq!(result.scanned, 3);
        assert_eq!(result.failed, 1);
        assert_eq!(result.matched, 2);
        assert_eq!(result.excluded, 1);
        assert_eq!(result.records.len(), 1);
        assert!(result.warnings.iter().any(|w| w.starts_with("GONE")));
    }

    #[tokio::test]
    async fn test_invalid_filters_rejected() {
        let screener = screener(source());
        let zero_limit = ScanFilters {
            limit: 0,
            ..Default::default()
        };
        assert!(matches!(assert_err!(screener.screen(zero_limit).await), AnalysisError::InvalidInput(_)));
        let negative = ScanFilters {
            max_pe: Some(-5.0),
            ..Default::default()
        };
        assert!(negative.validate().is_err());
        assert!(custom(&[]).validate().is_err());
        assert!(custom(&["GOOD", "not a ticker"]).validate().is_err());
    }

    #[test]
    fn test_filters_from_json() {
        let filters: ScanFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, ScanFilters::default());

        let filters: ScanFilters = serde_json::from_str(r#"{"index": "dow30", "max_pe": null, "limit": 5}"#).unwrap();
        assert_eq!(filters.index, IndexMembership::Dow30);
        assert_eq!(filters.max_pe, None);
        assert_eq!(filters.max_peg, Some(1.0));
        assert_eq!(filters.limit, 5);
    }

    #[test]
    fn test_pe_bound_is_strict_and_positive() {
        assert!(under(Some(24.9), Some(25.0)));
        assert!(!under(Some(25.0), Some(25.0)));
        assert!(!under(Some(-3.0), Some(25.0)));
        assert!(!under(None, Some(25.0)));
        assert!(under(None, None));
    }

    #[test]
    fn test_index_universes() {
        assert_eq!(IndexMembership::Dow30.constituents().len(), 30);
        for index in IndexMembership::ALL {
            let parsed = parse_unique(index.constituents()).unwrap();
            assert_eq!(parsed.len(), index.constituents().len(), "{} has duplicates", index);
            assert_eq!(index.as_str().parse::<IndexMembership>().unwrap(), index);
        }
        assert_eq!("DJIA".parse::<IndexMembership>().unwrap(), IndexMembership::Dow30);
        assert!("ftse".parse::<IndexMembership>().is_err());
    }
}
