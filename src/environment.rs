use std::sync::Arc;

use candle_core::Tensor;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionScheme, CostModel};
use crate::data::DataFeeder;
use crate::error::{EnvError, Result};
use crate::metrics::{Metric, MetricReport};
use crate::observations::Observations;
use crate::reward::Reward;
use crate::scaler::Scaler;
use crate::state::State;

/// Fixed parameters of an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub initial_balance: f64,
    pub window_size: usize,
    pub max_episode_steps: usize,
    pub action_scheme: ActionScheme,
    pub cost_model: CostModel,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            window_size: 50,
            max_episode_steps: usize::MAX,
            action_scheme: ActionScheme::breakout(),
            cost_model: CostModel::None,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(EnvError::InvalidConfig(format!(
                "initial_balance must be > 0, received: {}",
                self.initial_balance
            )));
        }
        if self.window_size < 2 {
            return Err(EnvError::InvalidConfig(format!(
                "window_size must be >= 2, received: {}",
                self.window_size
            )));
        }
        if self.max_episode_steps == 0 {
            return Err(EnvError::InvalidConfig(
                "max_episode_steps must be > 0".to_string(),
            ));
        }
        self.action_scheme.validate()?;
        self.cost_model.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Running,
    Terminated,
}

/// Raw window and metric results accompanying every observation.
#[derive(Debug, Clone)]
pub struct Info {
    pub window: Observations,
    pub metrics: MetricReport,
}

/// Result of taking a step in the environment.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Tensor,
    pub reward: f64,
    /// Data exhausted.
    pub terminated: bool,
    /// Step limit reached.
    pub truncated: bool,
    pub info: Info,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Single-instrument trading environment with a gym-like reset/step interface.
pub struct TradingEnv {
    config: EnvConfig,
    feeder: Arc<dyn DataFeeder + Send + Sync>,
    scaler: Box<dyn Scaler>,
    reward: Box<dyn Reward>,
    metrics: Vec<Box<dyn Metric>>,
    observations: Observations,
    phase: Phase,
    cursor: usize,
    step_count: usize,
}

impl TradingEnv {
    pub fn new(
        config: EnvConfig,
        feeder: Arc<dyn DataFeeder + Send + Sync>,
        scaler: Box<dyn Scaler>,
        reward: Box<dyn Reward>,
        metrics: Vec<Box<dyn Metric>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.window_size < reward.min_window() {
            return Err(EnvError::InvalidConfig(format!(
                "{} reward needs window_size >= {}, received: {}",
                reward.name(),
                reward.min_window(),
                config.window_size
            )));
        }
        let observations = Observations::new(config.window_size)?;
        Ok(Self {
            config,
            feeder,
            scaler,
            reward,
            metrics,
            observations,
            phase: Phase::Uninitialized,
            cursor: 0,
            step_count: 0,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Index of the next bar to be fetched from the feeder.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn metric_report(&self) -> MetricReport {
        MetricReport::collect(&self.metrics)
    }

    fn info(&self) -> Info {
        Info {
            window: self.observations.clone(),
            metrics: self.metric_report(),
        }
    }

    fn fetch(&self, index: usize) -> Result<State> {
        self.feeder
            .get(index)
            .ok_or(EnvError::InsufficientData {
                required: index + 1,
                actual: self.feeder.len(),
            })
    }

    /// Starts a new episode from the first bar of the feeder.
    ///
    /// The first `window_size - 1` bars are preloaded with the initial
    /// balance, so the window is full once the first step has been taken.
    pub fn reset(&mut self) -> Result<(Tensor, Info)> {
        let available = self.feeder.len();
        if available < self.config.window_size {
            return Err(EnvError::InsufficientData {
                required: self.config.window_size,
                actual: available,
            });
        }

        self.observations.reset();
        self.cursor = 0;
        self.step_count = 0;

        while self.observations.len() < self.config.window_size - 1 {
            let mut state = self.fetch(self.cursor)?;
            state.set_balance(self.config.initial_balance);
            state.set_assets(0.0);
            state.set_allocation_percentage(0.0)?;
            self.observations.append(state);
            self.cursor += 1;
        }

        self.reward.reset(&self.observations);
        let seed = self.observations.last();
        for metric in self.metrics.iter_mut() {
            metric.reset(seed);
        }

        let observation = self.scaler.transform(&self.observations)?;
        self.phase = Phase::Running;

        info!(
            bars = available,
            window_size = self.config.window_size,
            initial_balance = self.config.initial_balance,
            "episode reset"
        );
        Ok((observation, self.info()))
    }

    /// Applies `action` at the current bar's close and advances one bar.
    ///
    /// An invalid action leaves the environment untouched. Once the new bar
    /// has been appended, any failure ends the episode and a `reset` is
    /// required.
    pub fn step(&mut self, action: Action) -> Result<StepResult> {
        if self.phase != Phase::Running {
            return Err(EnvError::InvalidState(format!(
                "step called while {:?}; call reset first",
                self.phase
            )));
        }

        let current = self
            .observations
            .last()
            .ok_or_else(|| EnvError::InvalidState("observation window is empty".to_string()))?;
        let target = self
            .config
            .action_scheme
            .resolve(action, current.allocation_percentage())?;

        let (balance, assets) = self.rebalance(current, target)?;

        let mut next = self.fetch(self.cursor)?;
        next.set_balance(balance);
        next.set_assets(assets);
        next.set_allocation_percentage(target)?;
        self.cursor += 1;
        self.step_count += 1;
        self.observations.append(next);

        match self.settle(target) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.phase = Phase::Terminated;
                warn!(step = self.step_count, error = %err, "step failed, episode ended");
                Err(err)
            }
        }
    }

    /// Reward, metrics and observation for the newly appended bar.
    fn settle(&mut self, target: f64) -> Result<StepResult> {
        let reward = self.reward.compute(&self.observations)?;

        let newest = self
            .observations
            .last()
            .ok_or_else(|| EnvError::InvalidState("observation window is empty".to_string()))?;
        for metric in self.metrics.iter_mut() {
            metric.update(newest)?;
        }

        let terminated = self.cursor >= self.feeder.len();
        let truncated = self.step_count >= self.config.max_episode_steps;

        debug!(
            step = self.step_count,
            target,
            account_value = newest.account_value(),
            reward,
            "step"
        );

        let observation = self.scaler.transform(&self.observations)?;
        let info = self.info();

        if terminated || truncated {
            self.phase = Phase::Terminated;
            info!(
                steps = self.step_count,
                terminated,
                truncated,
                metrics = ?info.metrics,
                "episode finished"
            );
        }

        Ok(StepResult {
            observation,
            reward,
            terminated,
            truncated,
            info,
        })
    }

    /// Post-trade (balance, assets) when moving `current` to `target`
    /// allocation at its close. An unchanged allocation trades nothing.
    fn rebalance(&self, current: &State, target: f64) -> Result<(f64, f64)> {
        if target == current.allocation_percentage() {
            return Ok((current.balance(), current.assets()));
        }
        let value = current.account_value();
        if current.close <= 0.0 {
            return Err(EnvError::undefined(
                "rebalance",
                format!("non-positive close price {}", current.close),
            ));
        }
        let assets = target * value / current.close;
        let traded = (assets - current.assets()) * current.close;
        let cost = self.config.cost_model.cost(traded);
        let balance = value - assets * current.close - cost;
        Ok((balance, assets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesFeeder;
    use crate::metrics::{AccountValue, DifferentActions, MaxDrawdown};
    use crate::action::Target;
    use crate::reward::{AccountValueChangeReward, StandardDeviationReward};
    use crate::scaler::{MinMaxScaler, FEATURE_COUNT};
    use crate::state::tests::bar;
    use approx::assert_relative_eq;

    fn feeder(closes: &[f64]) -> Arc<dyn DataFeeder + Send + Sync> {
        let states = closes
            .iter()
            .enumerate()
            .map(|(i, c)| bar(i as i64, *c))
            .collect();
        Arc::new(SeriesFeeder::new(states))
    }

    fn env_with(closes: &[f64], config: EnvConfig) -> TradingEnv {
        TradingEnv::new(
            config,
            feeder(closes),
            Box::new(MinMaxScaler::new(0.0, 100.0).unwrap()),
            Box::new(AccountValueChangeReward::new()),
            vec![
                Box::new(AccountValue::new()),
                Box::new(DifferentActions::new()),
                Box::new(MaxDrawdown::new()),
            ],
        )
        .unwrap()
    }

    fn small_config(window_size: usize) -> EnvConfig {
        EnvConfig {
            initial_balance: 1000.0,
            window_size,
            ..EnvConfig::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let bad = [
            EnvConfig {
                initial_balance: 0.0,
                ..small_config(2)
            },
            EnvConfig {
                window_size: 1,
                ..small_config(2)
            },
            EnvConfig {
                max_episode_steps: 0,
                ..small_config(2)
            },
            EnvConfig {
                cost_model: CostModel::Proportional { rate: 2.0 },
                ..small_config(2)
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(EnvError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = env_with(&[10.0, 11.0, 12.0], small_config(2));
        assert_eq!(env.phase(), Phase::Uninitialized);
        assert!(matches!(
            env.step(Action::Discrete(0)),
            Err(EnvError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reset_preloads_window() {
        let mut env = env_with(&[10.0, 11.0, 12.0, 13.0], small_config(3));
        let (obs, info) = env.reset().unwrap();

        assert_eq!(env.phase(), Phase::Running);
        assert_eq!(obs.dims(), &[2, FEATURE_COUNT]);
        assert_eq!(info.window.len(), 2);
        assert_eq!(env.cursor(), 2);
        for state in info.window.iter() {
            assert_eq!(state.balance(), 1000.0);
            assert_eq!(state.allocation_percentage(), 0.0);
        }
        assert_eq!(info.metrics.get("account_value"), Some(1000.0));
    }

    #[test]
    fn test_reset_requires_enough_bars() {
        let mut env = env_with(&[10.0], small_config(2));
        assert!(matches!(
            env.reset(),
            Err(EnvError::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_buy_tracks_price() {
        let mut env = env_with(&[10.0, 11.0, 12.0], small_config(2));
        env.reset().unwrap();

        let result = env.step(Action::Discrete(2)).unwrap();
        let newest = result.info.window.get(-1).unwrap();
        assert_eq!(newest.assets(), 100.0);
        assert_eq!(newest.balance(), 0.0);
        assert_eq!(newest.account_value(), 1100.0);
        assert_relative_eq!(result.reward, 0.1, epsilon = 1e-12);
        assert!(!result.done());
    }

    #[test]
    fn test_hold_keeps_cash() {
        let mut env = env_with(&[10.0, 5.0, 20.0], small_config(2));
        env.reset().unwrap();
        let result = env.step(Action::Discrete(0)).unwrap();
        assert_eq!(result.reward, 0.0);
        assert_eq!(result.info.metrics.get("account_value"), Some(1000.0));
    }

    #[test]
    fn test_invalid_action_leaves_env_untouched() {
        let mut env = env_with(&[10.0, 11.0, 12.0], small_config(2));
        env.reset().unwrap();
        assert!(matches!(
            env.step(Action::Discrete(7)),
            Err(EnvError::InvalidAction(_))
        ));
        assert_eq!(env.step_count(), 0);
        assert_eq!(env.cursor(), 1);
        assert!(env.step(Action::Discrete(2)).is_ok());
    }

    #[test]
    fn test_terminates_on_data_exhaustion() {
        let mut env = env_with(&[10.0, 11.0, 12.0], small_config(2));
        env.reset().unwrap();
        assert!(!env.step(Action::Discrete(2)).unwrap().terminated);
        let last = env.step(Action::Discrete(0)).unwrap();
        assert!(last.terminated);
        assert!(!last.truncated);
        assert_eq!(env.phase(), Phase::Terminated);
        assert!(matches!(
            env.step(Action::Discrete(0)),
            Err(EnvError::InvalidState(_))
        ));
    }

    #[test]
    fn test_truncates_on_step_limit() {
        let config = EnvConfig {
            max_episode_steps: 2,
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 11.0, 12.0, 13.0, 14.0], config);
        env.reset().unwrap();
        env.step(Action::Discrete(0)).unwrap();
        let result = env.step(Action::Discrete(0)).unwrap();
        assert!(result.truncated);
        assert!(!result.terminated);
        assert_eq!(env.phase(), Phase::Terminated);
    }

    #[test]
    fn test_proportional_cost_reduces_balance() {
        let config = EnvConfig {
            cost_model: CostModel::Proportional { rate: 0.01 },
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 10.0, 10.0], config);
        env.reset().unwrap();
        let result = env.step(Action::Discrete(2)).unwrap();
        let newest = result.info.window.get(-1).unwrap();
        // 1000 traded at 1%
        assert_relative_eq!(newest.balance(), -10.0, epsilon = 1e-9);
        assert_relative_eq!(newest.account_value(), 990.0, epsilon = 1e-9);
    }

    #[test]
    fn test_continuous_partial_allocation() {
        let config = EnvConfig {
            action_scheme: ActionScheme::Continuous,
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 20.0, 20.0], config);
        env.reset().unwrap();
        let result = env.step(Action::Continuous(0.5)).unwrap();
        let newest = result.info.window.get(-1).unwrap();
        assert_eq!(newest.assets(), 50.0);
        assert_eq!(newest.balance(), 500.0);
        assert_eq!(newest.account_value(), 1500.0);
        assert!(env.step(Action::Continuous(1.2)).is_err());
    }

    #[test]
    fn test_hold_does_not_trade_under_cost() {
        let config = EnvConfig {
            action_scheme: ActionScheme::sell_hold_buy(),
            cost_model: CostModel::Proportional { rate: 0.01 },
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 10.0, 10.0], config);
        env.reset().unwrap();
        env.step(Action::Discrete(2)).unwrap();

        let result = env.step(Action::Discrete(1)).unwrap();
        let newest = result.info.window.get(-1).unwrap();
        assert_relative_eq!(newest.balance(), -10.0, epsilon = 1e-9);
        assert_eq!(newest.assets(), 100.0);
        assert_eq!(result.reward, 0.0);
    }

    #[test]
    fn test_hold_keeps_fractional_position() {
        let config = EnvConfig {
            action_scheme: ActionScheme::Discrete(vec![Target::Hold, Target::Allocate(0.5)]),
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 20.0, 20.0], config);
        env.reset().unwrap();
        env.step(Action::Discrete(1)).unwrap();

        let result = env.step(Action::Discrete(0)).unwrap();
        let newest = result.info.window.get(-1).unwrap();
        assert_eq!(newest.assets(), 50.0);
        assert_eq!(newest.balance(), 500.0);
        assert_eq!(newest.allocation_percentage(), 0.5);
        assert_eq!(newest.account_value(), 1500.0);
    }

    #[test]
    fn test_repeated_target_does_not_trade() {
        let config = EnvConfig {
            action_scheme: ActionScheme::Continuous,
            cost_model: CostModel::Proportional { rate: 0.01 },
            ..small_config(2)
        };
        let mut env = env_with(&[10.0, 20.0, 20.0], config);
        env.reset().unwrap();
        let first = env.step(Action::Continuous(0.5)).unwrap();
        let before = first.info.window.get(-1).unwrap().clone();

        let second = env.step(Action::Continuous(0.5)).unwrap();
        let after = second.info.window.get(-1).unwrap();
        assert_eq!(after.assets(), before.assets());
        assert_eq!(after.balance(), before.balance());
    }

    #[test]
    fn test_failed_step_requires_reset() {
        let mut env = TradingEnv::new(
            small_config(3),
            feeder(&[10.0, 10.0, 10.0, 11.0, 12.0]),
            Box::new(MinMaxScaler::new(0.0, 100.0).unwrap()),
            Box::new(StandardDeviationReward::default()),
            vec![Box::new(AccountValue::new())],
        )
        .unwrap();
        env.reset().unwrap();

        assert!(matches!(
            env.step(Action::Discrete(0)),
            Err(EnvError::ArithmeticUndefined { .. })
        ));
        assert_eq!(env.phase(), Phase::Terminated);
        assert!(matches!(
            env.step(Action::Discrete(0)),
            Err(EnvError::InvalidState(_))
        ));

        env.reset().unwrap();
        assert_eq!(env.phase(), Phase::Running);
        assert_eq!(env.step_count(), 0);
        assert_eq!(env.cursor(), 2);
    }

    #[test]
    fn test_reward_window_requirement() {
        let result = TradingEnv::new(
            small_config(2),
            feeder(&[10.0, 11.0, 12.0]),
            Box::new(MinMaxScaler::new(0.0, 100.0).unwrap()),
            Box::new(StandardDeviationReward::default()),
            Vec::new(),
        );
        assert!(matches!(result, Err(EnvError::InvalidConfig(_))));
    }
}
