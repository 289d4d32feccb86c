use candle_core::Tensor;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::action::{Action, ActionScheme};
use crate::environment::Info;
use crate::error::{EnvError, Result};

/// Anything that turns an observation into an action.
pub trait Policy {
    fn act(&mut self, observation: &Tensor, info: &Info) -> Result<Action>;

    fn reset(&mut self);
}

const ASIA_SESSION: u8 = 1;
const LONDON_OPEN_SESSION: u8 = 2;

/// Session breakout rule.
///
/// Tracks support (lowest close) and resistance (highest high) across Asia
/// session bars. During the London open it signals 1 when price closes below
/// support and 2 when it reaches resistance; meant to be paired with
/// [`ActionScheme::breakout`].
#[derive(Debug, Clone, Default)]
pub struct BreakoutPolicy {
    support: Option<f64>,
    resistance: Option<f64>,
}

impl BreakoutPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> (Option<f64>, Option<f64>) {
        (self.support, self.resistance)
    }
}

impl Policy for BreakoutPolicy {
    fn act(&mut self, _observation: &Tensor, info: &Info) -> Result<Action> {
        let state = info.window.get(-1)?;
        let mut signal = 0;

        match state.session {
            ASIA_SESSION => {
                if self.support.is_none_or(|s| state.close < s) {
                    self.support = Some(state.close);
                }
                if self.resistance.is_none_or(|r| state.high > r) {
                    self.resistance = Some(state.high);
                }
            }
            LONDON_OPEN_SESSION => match (self.support, self.resistance) {
                (Some(support), _) if state.close < support => signal = 1,
                (Some(_), Some(resistance)) if state.close >= resistance => signal = 2,
                _ => {}
            },
            _ => {}
        }

        if signal == 2 {
            self.reset();
        }
        Ok(Action::Discrete(signal))
    }

    fn reset(&mut self) {
        self.support = None;
        self.resistance = None;
    }
}

/// Uniformly random discrete actions from a fixed seed.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    seed: u64,
    num_actions: usize,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(scheme: &ActionScheme, seed: u64) -> Result<Self> {
        let num_actions = scheme
            .num_actions()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                EnvError::InvalidConfig("random policy needs a discrete action scheme".to_string())
            })?;
        Ok(Self {
            seed,
            num_actions,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &Tensor, _info: &Info) -> Result<Action> {
        Ok(Action::Discrete(self.rng.random_range(0..self.num_actions)))
    }

    /// Rewinds to the seed so every episode replays the same actions.
    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
