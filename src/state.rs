use chrono::NaiveDateTime;

use crate::error::{EnvError, Result};

/// Precomputed indicator values carried by a bar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Indicators {
    pub rsi: f64,
    pub macd: f64,
    pub signal: f64,
    pub ma: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub atr: f64,
    pub short_ema: f64,
    pub long_ema: f64,
}

/// One time bar: candle and indicator data plus the account bookkeeping
/// written when the bar becomes current.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub indicators: Indicators,
    /// 0 = no session, 1 = Asia, 2 = London open.
    pub session: u8,

    balance: f64,
    assets: f64,
    allocation_percentage: f64,
}

impl State {
    pub fn builder(timestamp: NaiveDateTime) -> StateBuilder {
        StateBuilder {
            timestamp: Some(timestamp),
            ..StateBuilder::default()
        }
    }

    /// Cash units held.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn set_balance(&mut self, value: f64) {
        self.balance = value;
    }

    /// Quantity of the instrument held.
    pub fn assets(&self) -> f64 {
        self.assets
    }

    pub fn set_assets(&mut self, value: f64) {
        self.assets = value;
    }

    pub fn allocation_percentage(&self) -> f64 {
        self.allocation_percentage
    }

    /// Fails without touching the state when `value` is outside [0, 1].
    pub fn set_allocation_percentage(&mut self, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(EnvError::AllocationOutOfRange(value));
        }
        self.allocation_percentage = value;
        Ok(())
    }

    pub fn account_value(&self) -> f64 {
        self.balance + self.assets * self.close
    }
}

/// Builder validating the fields every bar must carry.
#[derive(Debug, Default)]
pub struct StateBuilder {
    timestamp: Option<NaiveDateTime>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: f64,
    indicators: Indicators,
    session: u8,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn ohlc(mut self, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.close = Some(close);
        self
    }

    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn indicators(mut self, indicators: Indicators) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn session(mut self, session: u8) -> Self {
        self.session = session;
        self
    }

    pub fn build(self) -> Result<State> {
        let timestamp = self.timestamp.ok_or(EnvError::MissingField("timestamp"))?;
        let open = require_price("open", self.open)?;
        let high = require_price("high", self.high)?;
        let low = require_price("low", self.low)?;
        let close = require_price("close", self.close)?;
        if !self.volume.is_finite() {
            return Err(EnvError::InvalidPrice {
                field: "volume",
                value: self.volume,
            });
        }

        Ok(State {
            timestamp,
            open,
            high,
            low,
            close,
            volume: self.volume,
            indicators: self.indicators,
            session: self.session,
            balance: 0.0,
            assets: 0.0,
            allocation_percentage: 0.0,
        })
    }
}

fn require_price(field: &'static str, value: Option<f64>) -> Result<f64> {
    match value {
        None => Err(EnvError::MissingField(field)),
        Some(v) if !v.is_finite() => Err(EnvError::InvalidPrice { field, value: v }),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    pub(crate) fn ts(hours: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + Duration::hours(hours)
    }

    /// Bar with every price equal to `close`.
    pub(crate) fn bar(hours: i64, close: f64) -> State {
        State::builder(ts(hours))
            .ohlc(close, close, close, close)
            .build()
            .unwrap()
    }

    /// Bar whose account value equals `value` (all cash).
    pub(crate) fn valued(hours: i64, value: f64) -> State {
        let mut state = bar(hours, 1.0);
        state.set_balance(value);
        state
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = StateBuilder::new().ohlc(1.0, 1.0, 1.0, 1.0).build();
        assert!(matches!(err, Err(EnvError::MissingField("timestamp"))));

        let err = State::builder(ts(0)).open(1.0).high(1.0).low(1.0).build();
        assert!(matches!(err, Err(EnvError::MissingField("close"))));
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let err = State::builder(ts(0)).ohlc(1.0, f64::NAN, 1.0, 1.0).build();
        assert!(matches!(err, Err(EnvError::InvalidPrice { field: "high", .. })));
    }

    #[test]
    fn test_new_state_has_empty_account() {
        let state = bar(0, 10.0);
        assert_eq!(state.balance(), 0.0);
        assert_eq!(state.assets(), 0.0);
        assert_eq!(state.allocation_percentage(), 0.0);
        assert_eq!(state.account_value(), 0.0);
    }

    #[test]
    fn test_account_value() {
        let mut state = bar(0, 12.5);
        state.set_balance(100.0);
        state.set_assets(4.0);
        assert_eq!(state.account_value(), 150.0);
    }

    #[test]
    fn test_allocation_bounds_inclusive() {
        let mut state = bar(0, 1.0);
        assert!(state.set_allocation_percentage(0.0).is_ok());
        assert!(state.set_allocation_percentage(1.0).is_ok());
        assert_eq!(state.allocation_percentage(), 1.0);

        assert!(matches!(
            state.set_allocation_percentage(1.01),
            Err(EnvError::AllocationOutOfRange(_))
        ));
        assert!(state.set_allocation_percentage(-0.1).is_err());
        assert!(state.set_allocation_percentage(f64::NAN).is_err());
        // failed writes leave the previous value in place
        assert_eq!(state.allocation_percentage(), 1.0);
    }
}
