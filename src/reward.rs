use crate::error::{EnvError, Result};
use crate::observations::Observations;

/// Per-step reward computed over the observation window.
pub trait Reward: Send {
    fn name(&self) -> &str;

    /// Clears running state at the start of an episode.
    fn reset(&mut self, observations: &Observations);

    /// Requires at least two states in the window.
    fn compute(&mut self, observations: &Observations) -> Result<f64>;

    /// Smallest window the reward can produce a value over.
    fn min_window(&self) -> usize {
        2
    }
}

fn require_pair(observations: &Observations) -> Result<()> {
    if observations.len() < 2 {
        return Err(EnvError::InsufficientWindow {
            required: 2,
            actual: observations.len(),
        });
    }
    Ok(())
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple return of the account value over the last step.
#[derive(Debug, Clone, Default)]
pub struct AccountValueChangeReward;

impl AccountValueChangeReward {
    pub fn new() -> Self {
        Self
    }
}

impl Reward for AccountValueChangeReward {
    fn name(&self) -> &str {
        "account_value_change"
    }

    fn reset(&mut self, _observations: &Observations) {}

    fn compute(&mut self, observations: &Observations) -> Result<f64> {
        require_pair(observations)?;
        let last = observations.get(-2)?.account_value();
        let next = observations.get(-1)?.account_value();
        if last == 0.0 {
            return Err(EnvError::undefined(
                "account_value_change reward",
                "previous account value is zero",
            ));
        }
        Ok((next - last) / last)
    }
}

/// Volatility-targeted reward over the price differences of the window.
///
/// Keeps an exponentially weighted estimate of the price-difference
/// volatility across calls, scales the mean additive profit net of a
/// basis-point transaction cost by `sigma_target / sigma` and by the last
/// account value ratio.
#[derive(Debug, Clone)]
pub struct StandardDeviationReward {
    sigma_target: f64,
    basis_points: f64,
    mu: f64,
    sigma_estimate: Vec<f64>,
}

impl Default for StandardDeviationReward {
    fn default() -> Self {
        Self::new(0.2, 0.0001, 1.0)
    }
}

impl StandardDeviationReward {
    pub fn new(sigma_target: f64, basis_points: f64, mu: f64) -> Self {
        Self {
            sigma_target,
            basis_points,
            mu,
            sigma_estimate: Vec::new(),
        }
    }

    /// Volatility estimates produced so far this episode.
    pub fn sigma_history(&self) -> &[f64] {
        &self.sigma_estimate
    }

    fn next_sigma(&self, rt: &[f64]) -> f64 {
        let current = std_dev(rt);
        match self.sigma_estimate.last() {
            None => current,
            Some(prev) => (0.9 * prev.powi(2) + 0.1 * current.powi(2)).sqrt(),
        }
    }
}

impl Reward for StandardDeviationReward {
    fn name(&self) -> &str {
        "standard_deviation"
    }

    /// Two states give a single price difference, whose deviation is zero.
    fn min_window(&self) -> usize {
        3
    }

    fn reset(&mut self, _observations: &Observations) {
        self.sigma_estimate.clear();
    }

    fn compute(&mut self, observations: &Observations) -> Result<f64> {
        require_pair(observations)?;

        let last = observations.get(-1)?;
        let prev = observations.get(-2)?;
        if prev.account_value() == 0.0 {
            return Err(EnvError::undefined(
                "standard_deviation reward",
                "account value two steps back is zero",
            ));
        }

        let closes: Vec<f64> = observations.iter().map(|s| s.close).collect();
        let rt: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

        let sigma = self.next_sigma(&rt);
        if sigma == 0.0 {
            return Err(EnvError::undefined(
                "standard_deviation reward",
                "price volatility estimate is zero",
            ));
        }
        self.sigma_estimate.push(sigma);

        let scaling = (self.sigma_target / sigma) * (last.account_value() / prev.account_value());
        let transaction_cost = self.basis_points * prev.close;

        let net: Vec<f64> = rt.iter().map(|r| r - transaction_cost).collect();
        Ok(self.mu * scaling * mean(&net))
    }
}
