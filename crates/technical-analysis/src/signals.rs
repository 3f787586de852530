use analysis_core::Signal;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

pub fn rsi_signal(rsi: f64) -> Signal {
    if rsi < RSI_OVERSOLD {
        Signal::Bullish
    } else if rsi > RSI_OVERBOUGHT {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

/// Histogram sign change between the previous and latest bar
pub fn macd_signal(prev_hist: f64, last_hist: f64) -> Signal {
    if prev_hist < 0.0 && last_hist > 0.0 {
        Signal::Bullish
    } else if prev_hist > 0.0 && last_hist < 0.0 {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

pub fn bollinger_signal(close: f64, lower: f64, upper: f64) -> Signal {
    if close < lower {
        Signal::Bullish
    } else if close > upper {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

/// Golden cross when the short average moves above the long one on the latest bar,
/// death cross on the mirror move
pub fn sma_cross_signal(prev_short: f64, prev_long: f64, last_short: f64, last_long: f64) -> Signal {
    if prev_short <= prev_long && last_short > last_long {
        Signal::Bullish
    } else if prev_short >= prev_long && last_short < last_long {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_thresholds() {
        assert_eq!(rsi_signal(25.0), Signal::Bullish);
        assert_eq!(rsi_signal(30.0), Signal::Neutral);
        assert_eq!(rsi_signal(70.0), Signal::Neutral);
        assert_eq!(rsi_signal(70.1), Signal::Bearish);
    }

    #[test]
    fn test_macd_crossing() {
        assert_eq!(macd_signal(-0.2, 0.1), Signal::Bullish);
        assert_eq!(macd_signal(0.2, -0.1), Signal::Bearish);
        assert_eq!(macd_signal(0.1, 0.3), Signal::Neutral);
        assert_eq!(macd_signal(0.0, 0.3), Signal::Neutral);
    }

    #[test]
    fn test_bollinger_breakouts() {
        assert_eq!(bollinger_signal(94.0, 95.0, 105.0), Signal::Bullish);
        assert_eq!(bollinger_signal(106.0, 95.0, 105.0), Signal::Bearish);
        assert_eq!(bollinger_signal(95.0, 95.0, 105.0), Signal::Neutral);
    }

    #[test]
    fn test_sma_cross() {
        assert_eq!(sma_cross_signal(99.0, 100.0, 101.0, 100.0), Signal::Bullish);
        assert_eq!(sma_cross_signal(100.0, 100.0, 101.0, 100.0), Signal::Bullish);
        assert_eq!(sma_cross_signal(101.0, 100.0, 99.0, 100.0), Signal::Bearish);
        // stable ordering either way is not a cross
        assert_eq!(sma_cross_signal(110.0, 100.0, 111.0, 100.0), Signal::Neutral);
        assert_eq!(sma_cross_signal(90.0, 100.0, 91.0, 100.0), Signal::Neutral);
    }
}
