//! Close-price indicators. Every function returns only fully-formed values: a
//! series shorter than the window yields an empty vector, never a partial number.

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEV: f64 = 2.0;
pub const SMA_SHORT: usize = 50;
pub const SMA_LONG: usize = 200;
pub const TREND_PERIOD: usize = 20;

/// Closes needed for one RSI value
pub const RSI_REQUIRED: usize = RSI_PERIOD + 1;
/// Closes needed for two histogram values (the crossing rule compares them)
pub const MACD_REQUIRED: usize = MACD_SLOW + MACD_SIGNAL;
pub const BOLLINGER_REQUIRED: usize = BOLLINGER_PERIOD;
/// Closes needed for two SMA(200) values
pub const SMA_CROSS_REQUIRED: usize = SMA_LONG + 1;
pub const TREND_REQUIRED: usize = TREND_PERIOD;

/// Simple Moving Average. Value `k` covers `data[k..k + period]`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut sum: f64 = data[..period].iter().sum();
    result.push(sum / period as f64);

    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result.push(sum / period as f64);
    }
    result
}

/// Exponential Moving Average seeded with the SMA of the first `period` values.
///
/// The first output lines up with `data[period - 1]`, so the result has the
/// same alignment as [`sma`].
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut prev = data[..period].iter().sum::<f64>() / period as f64;
    result.push(prev);

    for &value in &data[period..] {
        prev = (value - prev) * multiplier + prev;
        result.push(prev);
    }
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value comes from the plain average of the first `period` changes,
/// so `period + 1` closes give exactly one reading.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = data
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(data.len() - period);
    values.push(rsi_from(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        values.push(rsi_from(avg_gain, avg_loss));
    }
    values
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD (Moving Average Convergence Divergence)
#[derive(Debug, Clone, Default)]
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    /// Aligned with `signal_line`
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || signal_period == 0 || slow_period <= fast_period {
        return MacdResult::default();
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    if ema_slow.is_empty() {
        return MacdResult::default();
    }

    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, slow)| ema_fast[i + offset] - slow)
        .collect();

    let signal_line = ema(&macd_line, signal_period);
    let hist_offset = macd_line.len() - signal_line.len();
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, signal)| macd_line[i + hist_offset] - signal)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands over the population standard deviation
#[derive(Debug, Clone, Default)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// `(upper - lower) / middle * 100` for the latest window
    pub fn last_bandwidth(&self) -> Option<f64> {
        let (upper, middle, lower) = (self.upper.last()?, self.middle.last()?, self.lower.last()?);
        if *middle == 0.0 {
            return None;
        }
        Some((upper - lower) / middle * 100.0)
    }
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    let middle = sma(data, period);
    if middle.is_empty() {
        return BollingerBands::default();
    }

    let (upper, lower) = middle
        .iter()
        .enumerate()
        .map(|(k, &mean)| {
            let window = &data[k..k + period];
            let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
            let band = std_dev * variance.sqrt();
            (mean + band, mean - band)
        })
        .unzip();

    BollingerBands { upper, middle, lower }
}

/// Percentage by which the last close sits above its SMA(`period`); negative when below
pub fn pct_above_sma(data: &[f64], period: usize) -> Option<f64> {
    let average = *sma(data, period).last()?;
    let close = *data.last()?;
    if average == 0.0 {
        return None;
    }
    Some((close - average) / average * 100.0)
}
