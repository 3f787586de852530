use analysis_core::{
    most_recent_news, CompanyInfo, EarningsPeriod, EarningsRecord, EarningsReport,
    FinancialMetrics, MarketDataSource, NewsItem, PriceBar, Quote, SourceError, SourceKind,
    Ticker,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::http::{number, text, SourceClient};
use crate::rate_gate::RateGate;
use crate::retry::RetryPolicy;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";

const FUNDAMENTAL_MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData,assetProfile,price";
const PROFILE_MODULES: &str = "assetProfile,price";
const EARNINGS_MODULES: &str = "incomeStatementHistory,incomeStatementHistoryQuarterly";
const EARNINGS_PER_KIND: usize = 4;

/// Primary source: Yahoo Finance public endpoints
pub struct YahooSource {
    client: SourceClient,
}

impl YahooSource {
    pub const NAME: &'static str = "yahoo";

    pub fn new(gate: Arc<RateGate>, retry: RetryPolicy, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: SourceClient::new(Self::NAME, gate, retry, timeout)?,
        })
    }

    async fn summary(&self, ticker: &Ticker, modules: &str) -> Result<Value, SourceError> {
        let url = format!("{}/{}", SUMMARY_URL, ticker);
        let json = self
            .client
            .get_json(&url, &[("modules", modules.to_string())])
            .await?;
        summary_result(ticker, &json).cloned()
    }
}

#[async_trait]
impl MarketDataSource for YahooSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Primary
    }

    async fn get_history(&self, ticker: &Ticker, lookback_days: u32) -> Result<Vec<PriceBar>, SourceError> {
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(lookback_days));
        let url = format!("{}/{}", CHART_URL, ticker);
        let json = self
            .client
            .get_json(
                &url,
                &[
                    ("period1", start.timestamp().to_string()),
                    ("period2", end.timestamp().to_string()),
                    ("interval", "1d".to_string()),
                ],
            )
            .await?;
        parse_chart_bars(ticker, &json)
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, SourceError> {
        let url = format!("{}/{}", CHART_URL, ticker);
        let json = self
            .client
            .get_json(&url, &[("range", "1d".to_string()), ("interval", "1d".to_string())])
            .await?;
        parse_chart_quote(ticker, &json)
    }

    async fn get_fundamentals(&self, ticker: &Ticker) -> Result<FinancialMetrics, SourceError> {
        let result = self.summary(ticker, FUNDAMENTAL_MODULES).await?;
        let metrics = parse_fundamentals(&result);
        if metrics.is_empty() {
            return Err(SourceError::Unavailable(format!("yahoo: no fundamentals for {ticker}")));
        }
        Ok(metrics)
    }

    async fn get_news(&self, ticker: &Ticker, limit: usize) -> Result<Vec<NewsItem>, SourceError> {
        let json = self
            .client
            .get_json(
                SEARCH_URL,
                &[
                    ("q", ticker.to_string()),
                    ("quotesCount", "0".to_string()),
                    ("newsCount", limit.to_string()),
                ],
            )
            .await?;
        Ok(parse_search_news(&json, limit))
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, SourceError> {
        let result = self.summary(ticker, PROFILE_MODULES).await?;
        Ok(parse_company_info(&result))
    }

    async fn get_earnings(&self, ticker: &Ticker) -> Result<EarningsReport, SourceError> {
        let result = self.summary(ticker, EARNINGS_MODULES).await?;
        let report = parse_earnings(&result);
        if report.is_empty() {
            return Err(SourceError::Unavailable(format!("yahoo: no income statements for {ticker}")));
        }
        Ok(report)
    }
}

fn provider_error(ticker: &Ticker, error: &Value) -> Option<SourceError> {
    if error.is_null() {
        return None;
    }
    let code = error.get("code").and_then(|c| c.as_str()).unwrap_or_default();
    let description = error
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default();
    if code.eq_ignore_ascii_case("Not Found") {
        Some(SourceError::NotFound(ticker.to_string()))
    } else {
        Some(SourceError::Unavailable(format!("yahoo: {code} {description}")))
    }
}

fn chart_result<'a>(ticker: &Ticker, json: &'a Value) -> Result<&'a Value, SourceError> {
    let chart = json
        .get("chart")
        .ok_or_else(|| SourceError::Unavailable("yahoo: response has no chart".into()))?;
    if let Some(err) = chart.get("error").and_then(|e| provider_error(ticker, e)) {
        return Err(err);
    }
    chart
        .pointer("/result/0")
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: empty chart for {ticker}")))
}

fn summary_result<'a>(ticker: &Ticker, json: &'a Value) -> Result<&'a Value, SourceError> {
    let summary = json
        .get("quoteSummary")
        .ok_or_else(|| SourceError::Unavailable("yahoo: response has no quoteSummary".into()))?;
    if let Some(err) = summary.get("error").and_then(|e| provider_error(ticker, e)) {
        return Err(err);
    }
    summary
        .pointer("/result/0")
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: empty summary for {ticker}")))
}

/// Daily bars from a v8 chart response; rows with a null field are skipped
pub fn parse_chart_bars(ticker: &Ticker, json: &Value) -> Result<Vec<PriceBar>, SourceError> {
    let result = chart_result(ticker, json)?;
    let timestamps = result
        .get("timestamp")
        .and_then(|t| t.as_array())
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: no timestamps for {ticker}")))?;
    let quote = result
        .pointer("/indicators/quote/0")
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: no quote block for {ticker}")))?;

    let column = |name: &str, i: usize| number(quote.get(name).and_then(|c| c.get(i)));

    let bars: Vec<PriceBar> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = ts
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.date_naive())?;
            Some(PriceBar {
                date,
                open: column("open", i)?,
                high: column("high", i)?,
                low: column("low", i)?,
                close: column("close", i)?,
                volume: column("volume", i).unwrap_or(0.0),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(SourceError::Unavailable(format!("yahoo: no usable bars for {ticker}")));
    }
    Ok(bars)
}

/// Current price from the chart metadata block
pub fn parse_chart_quote(ticker: &Ticker, json: &Value) -> Result<Quote, SourceError> {
    let meta = chart_result(ticker, json)?
        .get("meta")
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: no quote metadata for {ticker}")))?;
    let price = number(meta.get("regularMarketPrice"))
        .ok_or_else(|| SourceError::Unavailable(format!("yahoo: no price for {ticker}")))?;
    let previous = number(meta.get("previousClose")).or_else(|| number(meta.get("chartPreviousClose")));
    Ok(Quote::new(ticker.clone(), price, previous))
}

pub fn parse_fundamentals(result: &Value) -> FinancialMetrics {
    let at = |path: &str| number(result.pointer(path));
    FinancialMetrics {
        pe_ratio: at("/summaryDetail/trailingPE"),
        peg_ratio: at("/defaultKeyStatistics/pegRatio").or_else(|| at("/defaultKeyStatistics/trailingPegRatio")),
        pb_ratio: at("/defaultKeyStatistics/priceToBook"),
        roe: at("/financialData/returnOnEquity"),
        revenue_growth: at("/financialData/revenueGrowth"),
        // Reported in percent
        debt_ratio: at("/financialData/debtToEquity").map(|d| d / 100.0),
        market_cap: at("/price/marketCap").or_else(|| at("/summaryDetail/marketCap")),
        sector: text(result.pointer("/assetProfile/sector")),
        industry: text(result.pointer("/assetProfile/industry")),
    }
}

pub fn parse_company_info(result: &Value) -> CompanyInfo {
    CompanyInfo {
        name: text(result.pointer("/price/longName")).or_else(|| text(result.pointer("/price/shortName"))),
        sector: text(result.pointer("/assetProfile/sector")),
        industry: text(result.pointer("/assetProfile/industry")),
        market_cap: number(result.pointer("/price/marketCap")),
        currency: text(result.pointer("/price/currency")),
    }
}

pub fn parse_earnings(result: &Value) -> EarningsReport {
    EarningsReport {
        annual: income_statements(result.pointer("/incomeStatementHistory/incomeStatementHistory"), true),
        quarterly: income_statements(
            result.pointer("/incomeStatementHistoryQuarterly/incomeStatementHistory"),
            false,
        ),
    }
}

fn income_statements(list: Option<&Value>, annual: bool) -> Vec<EarningsRecord> {
    let Some(items) = list.and_then(|l| l.as_array()) else {
        return Vec::new();
    };

    let mut records: Vec<EarningsRecord> = items
        .iter()
        .filter_map(|item| {
            let date: NaiveDate = number(item.get("endDate"))
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
                .map(|dt| dt.date_naive())?;
            let period = if annual {
                EarningsPeriod::Annual
            } else {
                EarningsPeriod::quarter_of(date)
            };
            Some(EarningsRecord::new(
                date,
                period,
                number(item.get("totalRevenue")),
                number(item.get("grossProfit")),
                number(item.get("operatingIncome")),
                number(item.get("netIncome")),
            ))
        })
        .collect();

    records.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date));
    records.truncate(EARNINGS_PER_KIND);
    records
}

pub fn parse_search_news(json: &Value, limit: usize) -> Vec<NewsItem> {
    let items = json
        .get("news")
        .and_then(|n| n.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    Some(NewsItem {
                        title: text(item.get("title"))?,
                        description: text(item.get("summary")),
                        publisher: text(item.get("publisher")),
                        published_at: item
                            .get("providerPublishTime")
                            .and_then(|t| t.as_i64())
                            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    most_recent_news(items, limit)
}
