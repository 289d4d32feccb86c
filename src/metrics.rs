//! Running performance metrics.
//!
//! Every metric consumes one new [`State`] per environment step, in temporal
//! order, and copies the values it needs out of it.

use chrono::NaiveDateTime;

use crate::error::{EnvError, Result};
use crate::reward::{mean, std_dev};
use crate::state::State;

pub trait Metric: Send {
    fn name(&self) -> &str;

    fn update(&mut self, state: &State) -> Result<()>;

    fn result(&self) -> f64;

    /// Reinitializes the aggregate, optionally seeded with a carry-over state.
    fn reset(&mut self, prev_state: Option<&State>);
}

/// Ordered metric name → result pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricReport {
    entries: Vec<(String, f64)>,
}

impl MetricReport {
    pub fn collect(metrics: &[Box<dyn Metric>]) -> Self {
        Self {
            entries: metrics
                .iter()
                .map(|m| (m.name().to_string(), m.result()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Number of steps where the allocation changed.
#[derive(Debug, Clone)]
pub struct DifferentActions {
    name: String,
    prev_allocation: Option<f64>,
    different_actions: u64,
}

impl Default for DifferentActions {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferentActions {
    pub fn new() -> Self {
        Self::with_name("different_actions")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prev_allocation: None,
            different_actions: 0,
        }
    }
}

impl Metric for DifferentActions {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        let allocation = state.allocation_percentage();
        if let Some(prev) = self.prev_allocation {
            if allocation != prev {
                self.different_actions += 1;
            }
        }
        self.prev_allocation = Some(allocation);
        Ok(())
    }

    fn result(&self) -> f64 {
        self.different_actions as f64
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.prev_allocation = prev_state.map(State::allocation_percentage);
        self.different_actions = 0;
    }
}

/// Last observed account value.
#[derive(Debug, Clone)]
pub struct AccountValue {
    name: String,
    account_value: f64,
}

impl Default for AccountValue {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountValue {
    pub fn new() -> Self {
        Self::with_name("account_value")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_value: 0.0,
        }
    }
}

impl Metric for AccountValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        self.account_value = state.account_value();
        Ok(())
    }

    fn result(&self) -> f64 {
        self.account_value
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.account_value = prev_state.map_or(0.0, State::account_value);
    }
}

/// Percentage change of the account value against a fixed baseline.
#[derive(Debug, Clone)]
pub struct AccountValueChange {
    name: String,
    baseline: f64,
    account_value: f64,
}

impl AccountValueChange {
    pub fn new(baseline: f64) -> Result<Self> {
        Self::with_name("account_value_change", baseline)
    }

    pub fn with_name(name: impl Into<String>, baseline: f64) -> Result<Self> {
        if !(baseline.is_finite() && baseline > 0.0) {
            return Err(EnvError::InvalidConfig(format!(
                "account value baseline must be > 0, received: {baseline}"
            )));
        }
        Ok(Self {
            name: name.into(),
            baseline,
            account_value: 0.0,
        })
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }
}

impl Metric for AccountValueChange {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        self.account_value = state.account_value();
        Ok(())
    }

    fn result(&self) -> f64 {
        (self.account_value - self.baseline) / self.baseline * 100.0
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.account_value = prev_state.map_or(0.0, State::account_value);
    }
}

/// Largest relative peak-to-trough decline, reported as a value ≤ 0.
#[derive(Debug, Clone)]
pub struct MaxDrawdown {
    name: String,
    peak: f64,
    max_drawdown: f64,
}

impl Default for MaxDrawdown {
    fn default() -> Self {
        Self::new()
    }
}

impl MaxDrawdown {
    pub fn new() -> Self {
        Self::with_name("max_drawdown")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peak: 0.0,
            max_drawdown: 0.0,
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }
}

impl Metric for MaxDrawdown {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        let value = state.account_value();
        self.peak = self.peak.max(value);
        if self.peak <= 0.0 {
            return Err(EnvError::undefined(
                "max_drawdown",
                format!("peak account value is {}", self.peak),
            ));
        }
        let drawdown = (value - self.peak) / self.peak;
        self.max_drawdown = self.max_drawdown.min(drawdown);
        Ok(())
    }

    fn result(&self) -> f64 {
        self.max_drawdown
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.peak = prev_state.map_or(0.0, State::account_value);
        self.max_drawdown = 0.0;
    }
}

/// Annualized Sharpe ratio of daily account value returns.
#[derive(Debug, Clone)]
pub struct SharpeRatio {
    name: String,
    annualization_days: f64,
    prev: Option<(NaiveDateTime, f64)>,
    daily_returns: Vec<f64>,
}

impl Default for SharpeRatio {
    fn default() -> Self {
        Self::new(365.25)
    }
}

impl SharpeRatio {
    pub fn new(annualization_days: f64) -> Self {
        Self::with_name("sharpe_ratio", annualization_days)
    }

    pub fn with_name(name: impl Into<String>, annualization_days: f64) -> Self {
        Self {
            name: name.into(),
            annualization_days,
            prev: None,
            daily_returns: Vec::new(),
        }
    }

    pub fn daily_returns(&self) -> &[f64] {
        &self.daily_returns
    }
}

impl Metric for SharpeRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        let value = state.account_value();
        let Some((prev_ts, prev_value)) = self.prev else {
            self.prev = Some((state.timestamp, value));
            return Ok(());
        };

        if (state.timestamp - prev_ts).num_days() >= 1 {
            if prev_value == 0.0 {
                return Err(EnvError::undefined(
                    "sharpe_ratio",
                    "previous daily account value is zero",
                ));
            }
            self.daily_returns.push((value - prev_value) / prev_value);
            self.prev = Some((state.timestamp, value));
        }
        Ok(())
    }

    fn result(&self) -> f64 {
        if self.daily_returns.is_empty() {
            return 0.0;
        }
        let std = std_dev(&self.daily_returns);
        if std == 0.0 {
            return 0.0;
        }
        mean(&self.daily_returns) / std * self.annualization_days.sqrt()
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.prev = prev_state.map(|s| (s.timestamp, s.account_value()));
        self.daily_returns.clear();
    }
}

/// Tally of account value moves between consecutive updates.
#[derive(Debug, Clone, Copy, Default)]
struct MoveTally {
    prev_value: Option<f64>,
    wins: u64,
    losses: u64,
}

impl MoveTally {
    fn observe(&mut self, value: f64) {
        if let Some(prev) = self.prev_value {
            if value > prev {
                self.wins += 1;
            } else if value < prev {
                self.losses += 1;
            }
        }
        self.prev_value = Some(value);
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        *self = Self {
            prev_value: prev_state.map(State::account_value),
            ..Self::default()
        };
    }
}

/// Ratio of winning to losing steps.
#[derive(Debug, Clone)]
pub struct AverageWinLossRatio {
    name: String,
    tally: MoveTally,
}

impl Default for AverageWinLossRatio {
    fn default() -> Self {
        Self::new()
    }
}

impl AverageWinLossRatio {
    pub fn new() -> Self {
        Self::with_name("average_win_loss_ratio")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tally: MoveTally::default(),
        }
    }
}

impl Metric for AverageWinLossRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        self.tally.observe(state.account_value());
        Ok(())
    }

    fn result(&self) -> f64 {
        if self.tally.losses > 0 {
            self.tally.wins as f64 / self.tally.losses as f64
        } else {
            0.0
        }
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.tally.reset(prev_state);
    }
}

/// Number of steps where the account value rose.
#[derive(Debug, Clone)]
pub struct WinCount {
    name: String,
    tally: MoveTally,
}

impl Default for WinCount {
    fn default() -> Self {
        Self::new()
    }
}

impl WinCount {
    pub fn new() -> Self {
        Self::with_name("win_count")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tally: MoveTally::default(),
        }
    }
}

impl Metric for WinCount {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        self.tally.observe(state.account_value());
        Ok(())
    }

    fn result(&self) -> f64 {
        self.tally.wins as f64
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.tally.reset(prev_state);
    }
}

/// Number of steps where the account value fell.
#[derive(Debug, Clone)]
pub struct LossCount {
    name: String,
    tally: MoveTally,
}

impl Default for LossCount {
    fn default() -> Self {
        Self::new()
    }
}

impl LossCount {
    pub fn new() -> Self {
        Self::with_name("loss_count")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tally: MoveTally::default(),
        }
    }
}

impl Metric for LossCount {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, state: &State) -> Result<()> {
        self.tally.observe(state.account_value());
        Ok(())
    }

    fn result(&self) -> f64 {
        self.tally.losses as f64
    }

    fn reset(&mut self, prev_state: Option<&State>) {
        self.tally.reset(prev_state);
    }
}
