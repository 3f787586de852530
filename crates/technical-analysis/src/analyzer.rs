use analysis_core::{AnalysisError, PriceSeries, Recommendation, Signal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::indicators::*;
use crate::signals::*;

pub const RSI_NAME: &str = "RSI";
pub const MACD_NAME: &str = "MACD";
pub const BOLLINGER_NAME: &str = "Bollinger Bands";
pub const SMA_CROSS_NAME: &str = "SMA Cross";
pub const TREND_NAME: &str = "SMA20 Trend";

/// One indicator's outcome. An indicator below its window carries no number at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndicatorReading {
    Computed {
        name: String,
        values: BTreeMap<String, f64>,
        signal: Signal,
    },
    InsufficientData {
        name: String,
        required: usize,
        actual: usize,
    },
}

impl IndicatorReading {
    fn computed(name: &str, values: &[(&str, f64)], signal: Signal) -> Self {
        IndicatorReading::Computed {
            name: name.to_string(),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            signal,
        }
    }

    fn insufficient(name: &str, required: usize, actual: usize) -> Self {
        IndicatorReading::InsufficientData {
            name: name.to_string(),
            required,
            actual,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IndicatorReading::Computed { name, .. } | IndicatorReading::InsufficientData { name, .. } => name,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        match self {
            IndicatorReading::Computed { signal, .. } => Some(*signal),
            IndicatorReading::InsufficientData { .. } => None,
        }
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        match self {
            IndicatorReading::Computed { values, .. } => values.get(key).copied(),
            IndicatorReading::InsufficientData { .. } => None,
        }
    }

    pub fn as_error(&self) -> Option<AnalysisError> {
        match self {
            IndicatorReading::InsufficientData { name, required, actual } => Some(AnalysisError::InsufficientData {
                indicator: name.clone(),
                required: *required,
                actual: *actual,
            }),
            IndicatorReading::Computed { .. } => None,
        }
    }
}

/// Sum of signal weights over the indicators that could be computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: i32,
    pub available: usize,
    pub recommendation: Recommendation,
}

impl CompositeScore {
    pub fn from_readings(readings: &[IndicatorReading]) -> Self {
        let signals: Vec<Signal> = readings.iter().filter_map(IndicatorReading::signal).collect();
        let score = signals.iter().map(Signal::weight).sum();
        Self {
            score,
            available: signals.len(),
            recommendation: Recommendation::from_score(score),
        }
    }

    /// Score mapped onto 0..=100; 50 when nothing was computable
    pub fn normalized(&self) -> f64 {
        if self.available == 0 {
            return 50.0;
        }
        let available = self.available as f64;
        (self.score as f64 + available) / (2.0 * available) * 100.0
    }
}

/// Position of the last close relative to SMA(20)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReading {
    pub sma20: f64,
    pub close: f64,
    pub pct_above_sma20: f64,
    pub above_sma20: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub readings: Vec<IndicatorReading>,
    pub composite: CompositeScore,
    pub trend: Option<TrendReading>,
    pub bars_used: usize,
}

impl TechnicalReport {
    pub fn reading(&self, name: &str) -> Option<&IndicatorReading> {
        self.readings.iter().find(|r| r.name() == name)
    }

    /// Indicators left out of the composite for lack of history
    pub fn insufficient(&self) -> Vec<AnalysisError> {
        self.readings.iter().filter_map(IndicatorReading::as_error).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TechnicalAnalysisEngine;

impl TechnicalAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, series: &PriceSeries) -> TechnicalReport {
        self.analyze_closes(&series.closes())
    }

    pub fn analyze_closes(&self, closes: &[f64]) -> TechnicalReport {
        let readings = vec![
            rsi_reading(closes),
            macd_reading(closes),
            bollinger_reading(closes),
            sma_cross_reading(closes),
        ];
        let composite = CompositeScore::from_readings(&readings);

        TechnicalReport {
            readings,
            composite,
            trend: trend_reading(closes),
            bars_used: closes.len(),
        }
    }
}

fn rsi_reading(closes: &[f64]) -> IndicatorReading {
    match rsi(closes, RSI_PERIOD).last() {
        Some(&value) => IndicatorReading::computed(RSI_NAME, &[("rsi", value)], rsi_signal(value)),
        None => IndicatorReading::insufficient(RSI_NAME, RSI_REQUIRED, closes.len()),
    }
}

fn macd_reading(closes: &[f64]) -> IndicatorReading {
    let result = macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    match (result.histogram.as_slice(), result.macd_line.last(), result.signal_line.last()) {
        ([.., prev, last], Some(&line), Some(&signal)) => IndicatorReading::computed(
            MACD_NAME,
            &[("macd", line), ("signal", signal), ("histogram", *last)],
            macd_signal(*prev, *last),
        ),
        _ => IndicatorReading::insufficient(MACD_NAME, MACD_REQUIRED, closes.len()),
    }
}

fn bollinger_reading(closes: &[f64]) -> IndicatorReading {
    let bands = bollinger_bands(closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV);
    let latest = (bands.upper.last(), bands.middle.last(), bands.lower.last(), closes.last());
    match latest {
        (Some(&upper), Some(&middle), Some(&lower), Some(&close)) => {
            let mut values = vec![("upper", upper), ("middle", middle), ("lower", lower), ("close", close)];
            if let Some(bandwidth) = bands.last_bandwidth() {
                values.push(("bandwidth", bandwidth));
            }
            IndicatorReading::computed(BOLLINGER_NAME, &values, bollinger_signal(close, lower, upper))
        }
        _ => IndicatorReading::insufficient(BOLLINGER_NAME, BOLLINGER_REQUIRED, closes.len()),
    }
}

fn sma_cross_reading(closes: &[f64]) -> IndicatorReading {
    let short = sma(closes, SMA_SHORT);
    let long = sma(closes, SMA_LONG);
    match (short.as_slice(), long.as_slice()) {
        ([.., prev_short, last_short], [.., prev_long, last_long]) => IndicatorReading::computed(
            SMA_CROSS_NAME,
            &[("sma50", *last_short), ("sma200", *last_long)],
            sma_cross_signal(*prev_short, *prev_long, *last_short, *last_long),
        ),
        _ => IndicatorReading::insufficient(SMA_CROSS_NAME, SMA_CROSS_REQUIRED, closes.len()),
    }
}

fn trend_reading(closes: &[f64]) -> Option<TrendReading> {
    let sma20 = *sma(closes, TREND_PERIOD).last()?;
    let close = *closes.last()?;
    let pct_above_sma20 = pct_above_sma(closes, TREND_PERIOD)?;
    Some(TrendReading {
        sma20,
        close,
        pct_above_sma20,
        above_sma20: close > sma20,
    })
}
