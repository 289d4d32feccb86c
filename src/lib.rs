//! Step-driven trading simulator.
//!
//! A [`TradingEnv`] walks a single instrument's bar series, turns policy
//! actions into allocation changes, and reports a scaled observation, a
//! reward and running metrics after every step.

pub mod action;
pub mod config;
pub mod data;
pub mod device;
pub mod environment;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod observations;
pub mod policy;
pub mod reward;
pub mod scaler;
pub mod state;

pub use action::{Action, ActionScheme, CostModel, Target};
pub use config::SimulationConfig;
pub use data::{Candle, DataFeeder, SeriesFeeder};
pub use environment::{EnvConfig, Info, Phase, StepResult, TradingEnv};
pub use error::{EnvError, Result};
pub use metrics::{Metric, MetricReport};
pub use observations::Observations;
pub use policy::{BreakoutPolicy, Policy, RandomPolicy};
pub use reward::Reward;
pub use scaler::{MinMaxScaler, Scaler, price_bounds};
pub use state::{Indicators, State};
