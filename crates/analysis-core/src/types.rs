use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AnalysisError;

/// Validated, upper-cased ticker symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub const MAX_LEN: usize = 10;

    /// Accepts symbols like `AAPL`, `BRK.B`, `BF-B`, `^GSPC` or `EURUSD=X`.
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let trimmed = raw.trim();
        let symbol = trimmed.to_ascii_uppercase();

        if symbol.is_empty() || symbol.len() > Self::MAX_LEN {
            return Err(AnalysisError::InvalidInput(format!(
                "ticker '{}' must be 1-{} characters",
                trimmed,
                Self::MAX_LEN
            )));
        }

        let mut chars = symbol.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphanumeric() || c == '^')
            .unwrap_or(false);
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '=' | '^'));

        if !first_ok || !rest_ok {
            return Err(AnalysisError::InvalidInput(format!(
                "ticker '{}' contains invalid characters",
                trimmed
            )));
        }

        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Which data path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Real,
    Fallback,
    Simulated,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Real => "real",
            Provenance::Fallback => "fallback",
            Provenance::Simulated => "simulated",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chronological bars for one ticker, tagged with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PriceSeriesParts")]
pub struct PriceSeries {
    pub ticker: Ticker,
    pub provenance: Provenance,
    pub bars: Vec<PriceBar>,
}

#[derive(Deserialize)]
struct PriceSeriesParts {
    ticker: Ticker,
    provenance: Provenance,
    bars: Vec<PriceBar>,
}

impl From<PriceSeriesParts> for PriceSeries {
    fn from(parts: PriceSeriesParts) -> Self {
        PriceSeries::new(parts.ticker, parts.bars, parts.provenance)
    }
}

impl PriceSeries {
    /// Sorts bars by date. When a date repeats, the bar supplied last wins.
    pub fn new(ticker: Ticker, mut bars: Vec<PriceBar>, provenance: Provenance) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by(|later, kept| {
            if later.date == kept.date {
                std::mem::swap(later, kept);
                true
            } else {
                false
            }
        });

        Self {
            ticker,
            provenance,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Absolute and percent change between the last two closes
    pub fn last_change(&self) -> Option<(f64, f64)> {
        let n = self.bars.len();
        if n < 2 {
            return None;
        }
        let prev = self.bars[n - 2].close;
        let last = self.bars[n - 1].close;
        if prev == 0.0 {
            return None;
        }
        Some((last - prev, (last - prev) / prev * 100.0))
    }

    /// The most recent `n` bars
    pub fn tail(&self, n: usize) -> &[PriceBar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }
}

/// Fundamental ratios. Every field is optional: absent means unknown, never zero.
/// Ratio fields are fractions (`roe = 0.15` is 15%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub pe_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub debt_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

macro_rules! metric_fields {
    ($mac:ident) => {
        $mac!(pe_ratio, peg_ratio, pb_ratio, roe, revenue_growth, debt_ratio, market_cap, sector, industry)
    };
}

impl FinancialMetrics {
    /// Names of the fields that are not populated
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        macro_rules! check {
            ($($field:ident),*) => {
                $( if self.$field.is_none() { missing.push(stringify!($field)); } )*
            };
        }
        metric_fields!(check);
        missing
    }

    pub fn is_empty(&self) -> bool {
        self.missing_fields().len() == 9
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fills absent fields from `other` and returns the names of the fields filled
    pub fn merge_missing(&mut self, other: &FinancialMetrics) -> Vec<&'static str> {
        let mut filled = Vec::new();
        macro_rules! fill {
            ($($field:ident),*) => {
                $(
                    if self.$field.is_none() && other.$field.is_some() {
                        self.$field = other.$field.clone();
                        filled.push(stringify!($field));
                    }
                )*
            };
        }
        metric_fields!(fill);
        filled
    }
}

/// Latest price for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: Ticker,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

impl Quote {
    pub fn new(ticker: Ticker, price: f64, previous_close: Option<f64>) -> Self {
        let prev = previous_close.filter(|p| *p > 0.0);
        Self {
            ticker,
            price,
            previous_close,
            change: prev.map(|p| price - p),
            change_percent: prev.map(|p| (price - p) / p * 100.0),
        }
    }
}

/// News headline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Sorts most-recent-first (undated items last) and caps the batch
pub fn most_recent_news(mut items: Vec<NewsItem>, limit: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(limit);
    items
}

/// Company profile summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub currency: Option<String>,
}

/// Reporting period of an income statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarningsPeriod {
    Annual,
    Q1,
    Q2,
    Q3,
    Q4,
}

impl EarningsPeriod {
    /// Calendar quarter of a fiscal period end date
    pub fn quarter_of(date: NaiveDate) -> Self {
        match date.month() {
            1..=3 => EarningsPeriod::Q1,
            4..=6 => EarningsPeriod::Q2,
            7..=9 => EarningsPeriod::Q3,
            _ => EarningsPeriod::Q4,
        }
    }
}

/// One income statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub fiscal_date: NaiveDate,
    pub period: EarningsPeriod,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    /// Percent, two decimals
    pub gross_margin: Option<f64>,
    /// Percent, two decimals
    pub operating_margin: Option<f64>,
}

impl EarningsRecord {
    pub fn new(
        fiscal_date: NaiveDate,
        period: EarningsPeriod,
        revenue: Option<f64>,
        gross_profit: Option<f64>,
        operating_income: Option<f64>,
        net_income: Option<f64>,
    ) -> Self {
        Self {
            fiscal_date,
            period,
            revenue,
            gross_profit,
            operating_income,
            net_income,
            gross_margin: margin(gross_profit, revenue),
            operating_margin: margin(operating_income, revenue),
        }
    }
}

fn margin(numerator: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    match (numerator, revenue) {
        (Some(n), Some(r)) if r != 0.0 => Some((n / r * 10_000.0).round() / 100.0),
        _ => None,
    }
}

/// Annual and quarterly income statements, most recent first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsReport {
    pub annual: Vec<EarningsRecord>,
    pub quarterly: Vec<EarningsRecord>,
}

impl EarningsReport {
    pub fn is_empty(&self) -> bool {
        self.annual.is_empty() && self.quarterly.is_empty()
    }
}

/// Directional signal of a single indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Neutral,
    Bearish,
}

impl Signal {
    pub fn weight(&self) -> i32 {
        match self {
            Signal::Bullish => 1,
            Signal::Neutral => 0,
            Signal::Bearish => -1,
        }
    }
}

/// Five-level recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Strong_Sell")]
    StrongSell,
    #[serde(rename = "Sell")]
    Sell,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Buy")]
    Buy,
    #[serde(rename = "Strong_Buy")]
    StrongBuy,
}

impl Recommendation {
    /// Boundary values resolve toward the more neutral band
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 3 => Recommendation::StrongBuy,
            s if s >= 1 => Recommendation::Buy,
            s if s > -1 => Recommendation::Neutral,
            s if s > -3 => Recommendation::Sell,
            _ => Recommendation::StrongSell,
        }
    }

    /// +1 for the buy side, -1 for the sell side, 0 for neutral
    pub fn direction(&self) -> i32 {
        match self {
            Recommendation::StrongBuy | Recommendation::Buy => 1,
            Recommendation::Neutral => 0,
            Recommendation::Sell | Recommendation::StrongSell => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong_Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Neutral => "Neutral",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong_Sell",
        }
    }

    /// Human-readable label
    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Neutral => "Neutral",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a data source in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Primary,
    Fallback,
}

impl SourceKind {
    pub fn provenance(&self) -> Provenance {
        match self {
            SourceKind::Primary => Provenance::Real,
            SourceKind::Fallback => Provenance::Fallback,
        }
    }
}

/// Data plus the path that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub data: T,
    pub provenance: Provenance,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Fetched<T> {
    pub fn new(data: T, provenance: Provenance, source: impl Into<String>) -> Self {
        Self {
            data,
            provenance,
            source: source.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            provenance: self.provenance,
            source: self.source,
            warnings: self.warnings,
        }
    }
}
