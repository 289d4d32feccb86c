//! Simulation configuration
//!
//! TOML description of an environment and the builder that turns it into a
//! [`TradingEnv`].

use std::{path::Path, sync::Arc};

use serde::Deserialize;

use crate::action::{ActionScheme, CostModel};
use crate::data::DataFeeder;
use crate::environment::{EnvConfig, TradingEnv};
use crate::error::Result;
use crate::metrics::{
    AccountValue, AccountValueChange, AverageWinLossRatio, DifferentActions, LossCount,
    MaxDrawdown, Metric, SharpeRatio, WinCount,
};
use crate::reward::{AccountValueChangeReward, Reward, StandardDeviationReward};
use crate::scaler::Scaler;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub env: EnvSection,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            env: EnvSection::default(),
            reward: RewardConfig::default(),
            metrics: default_metrics(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvSection {
    pub initial_balance: f64,
    pub window_size: usize,
    /// Unlimited when omitted.
    #[serde(default)]
    pub max_episode_steps: Option<usize>,
    #[serde(default)]
    pub action_scheme: ActionSchemeConfig,
    #[serde(default)]
    pub cost_model: CostModel,
}

impl Default for EnvSection {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            window_size: 50,
            max_episode_steps: None,
            action_scheme: ActionSchemeConfig::default(),
            cost_model: CostModel::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscretePreset {
    #[default]
    Breakout,
    SellHoldBuy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSchemeConfig {
    Discrete {
        #[serde(default)]
        preset: DiscretePreset,
    },
    Continuous,
}

impl Default for ActionSchemeConfig {
    fn default() -> Self {
        Self::Discrete {
            preset: DiscretePreset::Breakout,
        }
    }
}

impl ActionSchemeConfig {
    pub fn build(self) -> ActionScheme {
        match self {
            Self::Discrete {
                preset: DiscretePreset::Breakout,
            } => ActionScheme::breakout(),
            Self::Discrete {
                preset: DiscretePreset::SellHoldBuy,
            } => ActionScheme::sell_hold_buy(),
            Self::Continuous => ActionScheme::Continuous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardConfig {
    AccountValueChange,
    StandardDeviation {
        #[serde(default = "default_sigma_target")]
        sigma_target: f64,
        #[serde(default = "default_basis_points")]
        basis_points: f64,
        #[serde(default = "default_mu")]
        mu: f64,
    },
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self::AccountValueChange
    }
}

fn default_sigma_target() -> f64 {
    0.2
}

fn default_basis_points() -> f64 {
    0.0001
}

fn default_mu() -> f64 {
    1.0
}

impl RewardConfig {
    pub fn build(&self) -> Box<dyn Reward> {
        match self {
            Self::AccountValueChange => Box::new(AccountValueChangeReward::new()),
            Self::StandardDeviation {
                sigma_target,
                basis_points,
                mu,
            } => Box::new(StandardDeviationReward::new(*sigma_target, *basis_points, *mu)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricConfig {
    DifferentActions,
    AccountValue,
    AccountValueChange {
        #[serde(default = "default_baseline")]
        baseline: f64,
    },
    MaxDrawdown,
    SharpeRatio {
        #[serde(default = "default_annualization_days")]
        annualization_days: f64,
    },
    AverageWinLossRatio,
    WinCount,
    LossCount,
}

fn default_annualization_days() -> f64 {
    365.25
}

fn default_baseline() -> f64 {
    10_000.0
}

fn default_metrics() -> Vec<MetricConfig> {
    vec![
        MetricConfig::DifferentActions,
        MetricConfig::AccountValue,
        MetricConfig::AccountValueChange {
            baseline: default_baseline(),
        },
        MetricConfig::MaxDrawdown,
        MetricConfig::SharpeRatio {
            annualization_days: default_annualization_days(),
        },
        MetricConfig::AverageWinLossRatio,
        MetricConfig::WinCount,
        MetricConfig::LossCount,
    ]
}

impl MetricConfig {
    /// Fresh metric instance; never shared between environments.
    pub fn build(&self) -> Result<Box<dyn Metric>> {
        let metric: Box<dyn Metric> = match self {
            Self::DifferentActions => Box::new(DifferentActions::new()),
            Self::AccountValue => Box::new(AccountValue::new()),
            Self::AccountValueChange { baseline } => Box::new(AccountValueChange::new(*baseline)?),
            Self::MaxDrawdown => Box::new(MaxDrawdown::new()),
            Self::SharpeRatio { annualization_days } => {
                Box::new(SharpeRatio::new(*annualization_days))
            }
            Self::AverageWinLossRatio => Box::new(AverageWinLossRatio::new()),
            Self::WinCount => Box::new(WinCount::new()),
            Self::LossCount => Box::new(LossCount::new()),
        };
        Ok(metric)
    }
}

impl SimulationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn env_config(&self) -> EnvConfig {
        EnvConfig {
            initial_balance: self.env.initial_balance,
            window_size: self.env.window_size,
            max_episode_steps: self.env.max_episode_steps.unwrap_or(usize::MAX),
            action_scheme: self.env.action_scheme.build(),
            cost_model: self.env.cost_model,
        }
    }

    pub fn build(
        &self,
        feeder: Arc<dyn DataFeeder + Send + Sync>,
        scaler: Box<dyn Scaler>,
    ) -> Result<TradingEnv> {
        let metrics = self
            .metrics
            .iter()
            .map(MetricConfig::build)
            .collect::<Result<Vec<_>>>()?;
        TradingEnv::new(self.env_config(), feeder, scaler, self.reward.build(), metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesFeeder;
    use crate::error::EnvError;
    use crate::scaler::MinMaxScaler;

    const SAMPLE: &str = r#"
        [env]
        initial_balance = 1000.0
        window_size = 10
        max_episode_steps = 500
        action_scheme = { kind = "continuous" }
        cost_model = { kind = "proportional", rate = 0.001 }

        [reward]
        kind = "standard_deviation"
        sigma_target = 0.3

        [[metrics]]
        kind = "account_value"

        [[metrics]]
        kind = "sharpe_ratio"
        annualization_days = 252.0

        [[metrics]]
        kind = "account_value_change"
        baseline = 1000.0
    "#;

    #[test]
    fn test_parse_sample() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        let env = config.env_config();
        assert_eq!(env.window_size, 10);
        assert_eq!(env.max_episode_steps, 500);
        assert_eq!(env.action_scheme, ActionScheme::Continuous);
        assert_eq!(env.cost_model, CostModel::Proportional { rate: 0.001 });
        assert_eq!(
            config.reward,
            RewardConfig::StandardDeviation {
                sigma_target: 0.3,
                basis_points: 0.0001,
                mu: 1.0,
            }
        );
        assert_eq!(
            config.metrics[1],
            MetricConfig::SharpeRatio {
                annualization_days: 252.0
            }
        );
        assert_eq!(
            config.metrics[2],
            MetricConfig::AccountValueChange { baseline: 1000.0 }
        );
    }

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::from_toml_str(
            "[env]\ninitial_balance = 500.0\nwindow_size = 2\n",
        )
        .unwrap();
        assert_eq!(config.reward, RewardConfig::AccountValueChange);
        assert_eq!(config.metrics.len(), 8);
        let env = config.env_config();
        assert_eq!(env.action_scheme, ActionScheme::breakout());
        assert_eq!(env.max_episode_steps, usize::MAX);
    }

    #[test]
    fn test_metrics_built_fresh_with_names() {
        let config = SimulationConfig::default();
        let names: Vec<String> = config
            .metrics
            .iter()
            .map(|m| m.build().unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "different_actions",
                "account_value",
                "account_value_change",
                "max_drawdown",
                "sharpe_ratio",
                "average_win_loss_ratio",
                "win_count",
                "loss_count",
            ]
        );
    }

    #[test]
    fn test_bad_baseline_rejected() {
        let metric = MetricConfig::AccountValueChange { baseline: 0.0 };
        assert!(matches!(
            metric.build(),
            Err(EnvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            SimulationConfig::from_toml_str("[env]\nwindow_size = \"ten\""),
            Err(EnvError::Toml(_))
        ));
    }

    #[test]
    fn test_window_too_short_for_reward() {
        let mut config = SimulationConfig::default();
        config.env.window_size = 2;
        config.reward = RewardConfig::StandardDeviation {
            sigma_target: 0.2,
            basis_points: 0.0001,
            mu: 1.0,
        };
        let result = config.build(
            Arc::new(SeriesFeeder::default()),
            Box::new(MinMaxScaler::new(0.0, 1.0).unwrap()),
        );
        assert!(matches!(result, Err(EnvError::InvalidConfig(_))));

        config.env.window_size = 3;
        assert!(config
            .build(
                Arc::new(SeriesFeeder::default()),
                Box::new(MinMaxScaler::new(0.0, 1.0).unwrap()),
            )
            .is_ok());
    }
}
