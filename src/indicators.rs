//! Indicator columns derived from raw candles.
//!
//! Undefined warm-up values are reported as `NaN`; [`enrich`] drops every
//! row that still carries one.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

use crate::data::Candle;
use crate::error::Result;
use crate::state::{Indicators, State};

pub const RSI_WINDOW: usize = 14;
pub const MACD_SHORT_SPAN: usize = 12;
pub const MACD_LONG_SPAN: usize = 26;
pub const MACD_SIGNAL_SPAN: usize = 9;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_STD: f64 = 2.0;
pub const ATR_WINDOW: usize = 14;

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            slice.iter().sum::<f64>() / window as f64
        })
        .collect()
}

/// Rolling sample standard deviation (ddof = 1).
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
            var.sqrt()
        })
        .collect()
}

/// Exponentially weighted mean with span-derived smoothing, bias adjusted,
/// defined from the first value on.
pub fn ewm_mean(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    values
        .iter()
        .map(|v| {
            numerator = v + decay * numerator;
            denominator = 1.0 + decay * denominator;
            numerator / denominator
        })
        .collect()
}

/// Relative strength index from simple rolling means of gains and losses.
pub fn rsi(close: &[f64], window: usize) -> Vec<f64> {
    let mut gains = Vec::with_capacity(close.len());
    let mut losses = Vec::with_capacity(close.len());
    for i in 0..close.len() {
        let delta = if i == 0 { 0.0 } else { close[i] - close[i - 1] };
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }
    let avg_gain = rolling_mean(&gains, window);
    let avg_loss = rolling_mean(&losses, window);
    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| 100.0 - 100.0 / (1.0 + g / l))
        .collect()
}

pub struct Macd {
    pub short_ema: Vec<f64>,
    pub long_ema: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

pub fn macd(close: &[f64], short_span: usize, long_span: usize, signal_span: usize) -> Macd {
    let short_ema = ewm_mean(close, short_span);
    let long_ema = ewm_mean(close, long_span);
    let macd: Vec<f64> = short_ema.iter().zip(&long_ema).map(|(s, l)| s - l).collect();
    let signal = ewm_mean(&macd, signal_span);
    Macd {
        short_ema,
        long_ema,
        macd,
        signal,
    }
}

pub struct Bollinger {
    pub ma: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(close: &[f64], window: usize, num_std: f64) -> Bollinger {
    let ma = rolling_mean(close, window);
    let std = rolling_std(close, window);
    let upper = ma.iter().zip(&std).map(|(m, s)| m + num_std * s).collect();
    let lower = ma.iter().zip(&std).map(|(m, s)| m - num_std * s).collect();
    Bollinger { ma, upper, lower }
}

/// Average true range; the first bar's range ignores the missing close.
pub fn atr(candles: &[Candle], window: usize) -> Vec<f64> {
    let true_range: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let high_low = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                None => high_low,
                Some(prev) => high_low
                    .max((c.high - prev).abs())
                    .max((c.low - prev).abs()),
            }
        })
        .collect();
    rolling_mean(&true_range, window)
}

/// 2 = London open (02:00–05:00), 1 = Asia (20:00–02:00), 0 otherwise or on
/// weekends.
pub fn session(timestamp: &NaiveDateTime) -> u8 {
    if matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun) {
        return 0;
    }
    match timestamp.hour() {
        2..=4 => 2,
        20..=23 | 0..=1 => 1,
        _ => 0,
    }
}

/// Builds complete states from raw candles, skipping rows whose indicators
/// are still warming up.
pub fn enrich(candles: &[Candle]) -> Result<Vec<State>> {
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let rsi = rsi(&close, RSI_WINDOW);
    let macd = macd(&close, MACD_SHORT_SPAN, MACD_LONG_SPAN, MACD_SIGNAL_SPAN);
    let bands = bollinger(&close, BOLLINGER_WINDOW, BOLLINGER_STD);
    let atr = atr(candles, ATR_WINDOW);

    let mut states = Vec::with_capacity(candles.len());
    for (i, candle) in candles.iter().enumerate() {
        let indicators = Indicators {
            rsi: rsi[i],
            macd: macd.macd[i],
            signal: macd.signal[i],
            ma: bands.ma[i],
            bb_upper: bands.upper[i],
            bb_lower: bands.lower[i],
            atr: atr[i],
            short_ema: macd.short_ema[i],
            long_ema: macd.long_ema[i],
        };
        let values = [
            indicators.rsi,
            indicators.macd,
            indicators.signal,
            indicators.ma,
            indicators.bb_upper,
            indicators.bb_lower,
            indicators.atr,
            indicators.short_ema,
            indicators.long_ema,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            continue;
        }

        let state = State::builder(candle.timestamp)
            .ohlc(candle.open, candle.high, candle.low, candle.close)
            .volume(candle.volume)
            .indicators(indicators)
            .session(session(&candle.timestamp))
            .build()?;
        states.push(state);
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::ts;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Candle {
                timestamp: ts(i as i64),
                open: *c,
                high: c + 1.0,
                low: c - 1.0,
                close: *c,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_rolling_mean() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_rolling_std_is_sample() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert_relative_eq!(out[7], (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_ewm_mean_adjusted() {
        // span 3 -> alpha 0.5: second value = (2 + 0.5 * 1) / 1.5
        let out = ewm_mean(&[1.0, 2.0], 3);
        assert_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 2.5 / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let out = rsi(&rising, 14);
        assert!(out[12].is_nan());
        assert_eq!(out[19], 100.0);

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, 14)[19], 0.0);
    }

    #[test]
    fn test_atr_uses_previous_close() {
        let mut data = candles(&[10.0, 10.0]);
        data[1].high = 15.0;
        data[1].low = 14.0;
        // gap up: |15 - 10| dominates the 1.0 range
        let out = atr(&data, 1);
        assert_eq!(out, vec![2.0, 5.0]);
    }

    #[test]
    fn test_session_markers() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(session(&(monday + Duration::hours(1))), 1);
        assert_eq!(session(&(monday + Duration::hours(3))), 2);
        assert_eq!(session(&(monday + Duration::hours(12))), 0);
        assert_eq!(session(&(monday + Duration::hours(21))), 1);
        // Saturday
        assert_eq!(session(&(monday + Duration::days(5) + Duration::hours(3))), 0);
    }

    #[test]
    fn test_enrich_drops_warmup() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let states = enrich(&candles(&closes)).unwrap();
        // bollinger needs 20 bars; the first 19 are dropped
        assert_eq!(states.len(), 21);
        assert_eq!(states[0].close, closes[19]);
        assert!(states.iter().all(|s| s.indicators.bb_upper >= s.indicators.bb_lower));
    }
}
