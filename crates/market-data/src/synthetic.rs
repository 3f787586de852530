//! Deterministic synthetic price history.
//!
//! Used only when no source can supply real bars. The walk is seeded from the
//! BLAKE3 hash of the upper-cased ticker and driven by ChaCha8, so the same
//! `(ticker, length)` always yields the same OHLCV values on every platform.

use analysis_core::{PriceBar, PriceSeries, Provenance, Ticker};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mean daily drift
const DRIFT: f64 = 0.0005;
/// Half-width of the uniform return shock; matches a 2% daily standard deviation
const SHOCK: f64 = 0.0346;

#[derive(Debug, Clone)]
pub struct SyntheticHistory {
    end_date: NaiveDate,
}

impl SyntheticHistory {
    pub fn new(end_date: NaiveDate) -> Self {
        Self { end_date }
    }

    pub fn ending_today() -> Self {
        Self::new(Utc::now().date_naive())
    }

    /// First 8 bytes of BLAKE3(upper-case ticker), little-endian
    pub fn seed_for(ticker: &Ticker) -> u64 {
        let hash = blake3::hash(ticker.as_str().to_ascii_uppercase().as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(seed)
    }

    pub fn generate(&self, ticker: &Ticker, length: usize) -> PriceSeries {
        let mut rng = ChaCha8Rng::seed_from_u64(Self::seed_for(ticker));
        let dates = business_days_ending(self.end_date, length);

        let mut close = rng.gen_range(20.0..200.0);
        let mut bars = Vec::with_capacity(length);

        for date in dates {
            close *= 1.0 + DRIFT + rng.gen_range(-SHOCK..SHOCK);
            let open = close * (1.0 + rng.gen_range(-0.005..0.005));
            let high = open.max(close) * (1.0 + rng.gen_range(0.001..0.02));
            let low = open.min(close) * (1.0 - rng.gen_range(0.001..0.02));
            let volume = rng.gen_range(10_000_000u64..100_000_000u64) as f64;

            bars.push(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        PriceSeries::new(ticker.clone(), bars, Provenance::Simulated)
    }

    /// Same walk, rescaled so the last close equals a known current price
    pub fn generate_anchored(&self, ticker: &Ticker, length: usize, last_close: f64) -> PriceSeries {
        let mut series = self.generate(ticker, length);
        let Some(current) = series.last_close() else {
            return series;
        };
        if last_close > 0.0 && current > 0.0 {
            let scale = last_close / current;
            for bar in &mut series.bars {
                bar.open *= scale;
                bar.high *= scale;
                bar.low *= scale;
                bar.close *= scale;
            }
        }
        series
    }
}

/// `count` consecutive weekdays, oldest first, ending on or before `end`
fn business_days_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = end;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= Duration::days(1);
    }
    dates.reverse();
    dates
}
