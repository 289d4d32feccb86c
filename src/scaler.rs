use candle_core::Tensor;

use crate::device::DEVICE;
use crate::error::{EnvError, Result};
use crate::observations::Observations;
use crate::state::State;

/// Columns produced for every state in the window.
pub const FEATURE_COUNT: usize = 16;

/// Column index of the raw session marker.
pub const SESSION_COLUMN: usize = 14;

/// Column index of the raw allocation fraction.
pub const ALLOCATION_COLUMN: usize = 15;

/// Turns an observation window into the feature matrix handed to the policy.
pub trait Scaler: Send {
    /// Returns a `(window length, FEATURE_COUNT)` tensor.
    fn transform(&self, observations: &Observations) -> Result<Tensor>;
}

/// Global (lowest low, highest high) over a price series.
///
/// Computed once by the caller and passed to [`MinMaxScaler::new`].
pub fn price_bounds(states: &[State]) -> Option<(f64, f64)> {
    if states.is_empty() {
        return None;
    }
    let min = states.iter().map(|s| s.low).fold(f64::INFINITY, f64::min);
    let max = states.iter().map(|s| s.high).fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

/// Min-max normalization against fixed dataset-wide bounds.
#[derive(Debug, Clone, Copy)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || max - min <= 0.0 {
            return Err(EnvError::InvalidScalerBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    fn scale(&self, value: f64) -> f32 {
        ((value - self.min) / (self.max - self.min)) as f32
    }

    /// One feature row: normalized prices and indicators, then raw session
    /// marker and allocation fraction.
    pub fn row(&self, state: &State) -> [f32; FEATURE_COUNT] {
        let ind = &state.indicators;
        [
            self.scale(state.open),
            self.scale(state.high),
            self.scale(state.low),
            self.scale(state.close),
            self.scale(state.volume),
            self.scale(ind.rsi),
            self.scale(ind.macd),
            self.scale(ind.signal),
            self.scale(ind.ma),
            self.scale(ind.bb_upper),
            self.scale(ind.bb_lower),
            self.scale(ind.atr),
            self.scale(ind.short_ema),
            self.scale(ind.long_ema),
            state.session as f32,
            state.allocation_percentage() as f32,
        ]
    }
}

impl Scaler for MinMaxScaler {
    fn transform(&self, observations: &Observations) -> Result<Tensor> {
        let mut data: Vec<f32> = Vec::with_capacity(observations.len() * FEATURE_COUNT);
        for state in observations {
            data.extend_from_slice(&self.row(state));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(EnvError::NonFiniteObservation);
        }
        let rows = observations.len();
        Ok(Tensor::from_vec(data, (rows, FEATURE_COUNT), &DEVICE)?)
    }
}
