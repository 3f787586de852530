use analysis_core::{
    most_recent_news, CompanyInfo, EarningsReport, FinancialMetrics, MarketDataSource, NewsItem,
    PriceBar, Quote, SourceError, SourceKind, Ticker,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::http::{number, text, SourceClient};
use crate::rate_gate::RateGate;
use crate::retry::RetryPolicy;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Fallback source: Alpha Vantage. Serves quotes, overview fundamentals, news and
/// compact daily history; earnings history is not served.
pub struct AlphaVantageSource {
    api_key: String,
    client: SourceClient,
}

impl AlphaVantageSource {
    pub const NAME: &'static str = "alpha_vantage";

    pub fn new(
        api_key: String,
        gate: Arc<RateGate>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            api_key,
            client: SourceClient::new(Self::NAME, gate, retry, timeout)?,
        })
    }

    async fn query(&self, function: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        let mut query = vec![("function", function.to_string()), ("apikey", self.api_key.clone())];
        query.extend(params.iter().cloned());

        self.client.get_json_checked(BASE_URL, &query, check_payload).await
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    async fn get_history(&self, ticker: &Ticker, lookback_days: u32) -> Result<Vec<PriceBar>, SourceError> {
        let json = self
            .query("TIME_SERIES_DAILY", &[("symbol", ticker.to_string()), ("outputsize", "compact".to_string())])
            .await?;
        let bars = parse_daily_series(ticker, &json)?;
        Ok(within_lookback(bars, lookback_days))
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, SourceError> {
        let json = self.query("GLOBAL_QUOTE", &[("symbol", ticker.to_string())]).await?;
        parse_global_quote(ticker, &json)
    }

    async fn get_fundamentals(&self, ticker: &Ticker) -> Result<FinancialMetrics, SourceError> {
        let json = self.query("OVERVIEW", &[("symbol", ticker.to_string())]).await?;
        let metrics = parse_overview(&json);
        if metrics.is_empty() {
            return Err(SourceError::Unavailable(format!("alpha_vantage: no overview for {ticker}")));
        }
        Ok(metrics)
    }

    async fn get_news(&self, ticker: &Ticker, limit: usize) -> Result<Vec<NewsItem>, SourceError> {
        let json = self
            .query(
                "NEWS_SENTIMENT",
                &[
                    ("tickers", ticker.to_string()),
                    ("sort", "LATEST".to_string()),
                    ("limit", limit.max(1).to_string()),
                ],
            )
            .await?;
        Ok(parse_news_feed(&json, limit))
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, SourceError> {
        let json = self.query("OVERVIEW", &[("symbol", ticker.to_string())]).await?;
        let info = parse_overview_company(&json);
        if info.name.is_none() && info.sector.is_none() {
            return Err(SourceError::Unavailable(format!("alpha_vantage: no profile for {ticker}")));
        }
        Ok(info)
    }

    async fn get_earnings(&self, _ticker: &Ticker) -> Result<EarningsReport, SourceError> {
        Err(SourceError::Unsupported {
            source_name: Self::NAME.to_string(),
            operation: "earnings history",
        })
    }
}

/// Alpha Vantage reports throttling and bad symbols in a 200 body
pub fn check_payload(json: &Value) -> Result<(), SourceError> {
    if let Some(msg) = text(json.get("Error Message")) {
        if msg.to_ascii_lowercase().contains("apikey") {
            return Err(SourceError::Unavailable(format!("alpha_vantage: {msg}")));
        }
        return Err(SourceError::NotFound(msg));
    }

    for key in ["Note", "Information"] {
        if let Some(msg) = text(json.get(key)) {
            if msg.to_ascii_lowercase().contains("premium") {
                return Err(SourceError::Unavailable(format!("alpha_vantage: {msg}")));
            }
            return Err(SourceError::RateLimited(format!("alpha_vantage: {msg}")));
        }
    }

    Ok(())
}

pub fn parse_global_quote(ticker: &Ticker, json: &Value) -> Result<Quote, SourceError> {
    let quote = json
        .get("Global Quote")
        .filter(|q| q.as_object().map(|o| !o.is_empty()).unwrap_or(false))
        .ok_or_else(|| SourceError::NotFound(ticker.to_string()))?;
    let price = number(quote.get("05. price"))
        .ok_or_else(|| SourceError::Unavailable(format!("alpha_vantage: no price for {ticker}")))?;
    Ok(Quote::new(ticker.clone(), price, number(quote.get("08. previous close"))))
}

pub fn parse_overview(json: &Value) -> FinancialMetrics {
    FinancialMetrics {
        pe_ratio: number(json.get("PERatio")),
        peg_ratio: number(json.get("PEGRatio")),
        pb_ratio: number(json.get("PriceToBookRatio")),
        roe: number(json.get("ReturnOnEquityTTM")),
        revenue_growth: number(json.get("QuarterlyRevenueGrowthYOY")),
        debt_ratio: None,
        market_cap: number(json.get("MarketCapitalization")),
        sector: text(json.get("Sector")).map(|s| normalize_sector(&s)),
        industry: text(json.get("Industry")).map(|s| title_case(&s)),
    }
}

pub fn parse_overview_company(json: &Value) -> CompanyInfo {
    CompanyInfo {
        name: text(json.get("Name")),
        sector: text(json.get("Sector")).map(|s| normalize_sector(&s)),
        industry: text(json.get("Industry")).map(|s| title_case(&s)),
        market_cap: number(json.get("MarketCapitalization")),
        currency: text(json.get("Currency")),
    }
}

/// Maps Alpha Vantage's upper-case sector names onto the Yahoo taxonomy used by the
/// sector PE table
pub fn normalize_sector(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TECHNOLOGY" => "Technology".to_string(),
        "LIFE SCIENCES" => "Healthcare".to_string(),
        "FINANCE" => "Financial Services".to_string(),
        "ENERGY & TRANSPORTATION" => "Energy".to_string(),
        "REAL ESTATE & CONSTRUCTION" => "Real Estate".to_string(),
        "MANUFACTURING" => "Industrials".to_string(),
        "TRADE & SERVICES" => "Consumer Cyclical".to_string(),
        _ => title_case(raw),
    }
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_daily_series(ticker: &Ticker, json: &Value) -> Result<Vec<PriceBar>, SourceError> {
    let series = json
        .get("Time Series (Daily)")
        .and_then(|s| s.as_object())
        .ok_or_else(|| SourceError::Unavailable(format!("alpha_vantage: no daily series for {ticker}")))?;

    let mut bars: Vec<PriceBar> = series
        .iter()
        .filter_map(|(date, row)| {
            Some(PriceBar {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                open: number(row.get("1. open"))?,
                high: number(row.get("2. high"))?,
                low: number(row.get("3. low"))?,
                close: number(row.get("4. close"))?,
                volume: number(row.get("5. volume")).unwrap_or(0.0),
            })
        })
        .collect();
    bars.sort_by_key(|b| b.date);

    if bars.is_empty() {
        return Err(SourceError::Unavailable(format!("alpha_vantage: empty daily series for {ticker}")));
    }
    Ok(bars)
}

fn within_lookback(bars: Vec<PriceBar>, lookback_days: u32) -> Vec<PriceBar> {
    let Some(last) = bars.last().map(|b| b.date) else {
        return bars;
    };
    let cutoff = last - ChronoDuration::days(i64::from(lookback_days));
    bars.into_iter().filter(|b| b.date >= cutoff).collect()
}

pub fn parse_news_feed(json: &Value, limit: usize) -> Vec<NewsItem> {
    let items = json
        .get("feed")
        .and_then(|f| f.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    Some(NewsItem {
                        title: text(item.get("title"))?,
                        description: text(item.get("summary")),
                        publisher: text(item.get("source")),
                        published_at: item
                            .get("time_published")
                            .and_then(|t| t.as_str())
                            .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y%m%dT%H%M%S").ok())
                            .map(|dt| dt.and_utc()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    most_recent_news(items, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ibm() -> Ticker {
        Ticker::parse("IBM").unwrap()
    }

    #[test]
    fn test_throttle_note_is_rate_limited() {
        let json = json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"});
        assert!(matches!(check_payload(&json), Err(SourceError::RateLimited(_))));

        let json = json!({"Information": "This is a premium endpoint."});
        assert!(matches!(check_payload(&json), Err(SourceError::Unavailable(_))));

        let json = json!({"Error Message": "Invalid API call. Please retry or visit the documentation"});
        assert!(matches!(check_payload(&json), Err(SourceError::NotFound(_))));

        assert!(check_payload(&json!({"Global Quote": {}})).is_ok());
    }

    #[test]
    fn test_parse_global_quote() {
        let json = json!({"Global Quote": {"01. symbol": "IBM", "05. price": "185.0000", "08. previous close": "180.0000"}});
        let quote = parse_global_quote(&ibm(), &json).unwrap();
        assert_eq!(quote.price, 185.0);
        assert!((quote.change_percent.unwrap() - 2.7777).abs() < 1e-3);

        let empty = json!({"Global Quote": {}});
        assert_eq!(
            parse_global_quote(&ibm(), &empty),
            Err(SourceError::NotFound("IBM".into()))
        );
    }

    #[test]
    fn test_parse_overview() {
        let json = json!({
            "Symbol": "IBM", "Name": "International Business Machines", "Currency": "USD",
            "Sector": "TECHNOLOGY", "Industry": "COMPUTER & OFFICE EQUIPMENT",
            "MarketCapitalization": "170000000000", "PERatio": "22.5", "PEGRatio": "None",
            "PriceToBookRatio": "7.2", "ReturnOnEquityTTM": "0.35", "QuarterlyRevenueGrowthYOY": "-0.01"
        });
        let m = parse_overview(&json);
        assert_eq!(m.pe_ratio, Some(22.5));
        assert_eq!(m.peg_ratio, None);
        assert_eq!(m.revenue_growth, Some(-0.01));
        assert_eq!(m.sector.as_deref(), Some("Technology"));
        assert_eq!(m.industry.as_deref(), Some("Computer & Office Equipment"));

        let info = parse_overview_company(&json);
        assert_eq!(info.name.as_deref(), Some("International Business Machines"));
        assert_eq!(info.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_sector_aliases() {
        assert_eq!(normalize_sector("LIFE SCIENCES"), "Healthcare");
        assert_eq!(normalize_sector("FINANCE"), "Financial Services");
        assert_eq!(normalize_sector("utilities"), "Utilities");
    }

    #[test]
    fn test_parse_daily_series_sorted_and_trimmed() {
        let json = json!({"Time Series (Daily)": {
            "2024-03-04": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.5", "5. volume": "1000"},
            "2024-01-02": {"1. open": "8", "2. high": "9", "3. low": "7", "4. close": "8.5", "5. volume": "900"},
            "2024-03-01": {"1. open": "9", "2. high": "10", "3. low": "8", "4. close": "9.5", "5. volume": "950"}
        }});
        let bars = parse_daily_series(&ibm(), &json).unwrap();
        assert_eq!(bars.first().unwrap().close, 8.5);
        assert_eq!(bars.last().unwrap().close, 10.5);

        let recent = within_lookback(bars, 30);
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_parse_news_feed() {
        let json = json!({"feed": [
            {"title": "IBM wins contract", "summary": "Strong growth", "source": "Benzinga", "time_published": "20240105T133000"},
            {"title": "IBM misses", "source": "Reuters", "time_published": "20240106T090000"}
        ]});
        let news = parse_news_feed(&json, 1);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "IBM misses");
    }
}
