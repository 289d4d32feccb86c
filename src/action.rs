use serde::Deserialize;

use crate::error::{EnvError, Result};

/// Raw action emitted by a policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Discrete(usize),
    Continuous(f64),
}

/// What a discrete action asks the account to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// Keep the current allocation.
    Hold,
    /// Move to this fraction of the account value in the instrument.
    Allocate(f64),
}

/// Fixed mapping from policy actions to target allocations.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionScheme {
    /// Action `i` selects `targets[i]`.
    Discrete(Vec<Target>),
    /// The action is the target allocation itself.
    Continuous,
}

impl ActionScheme {
    /// 0 = no signal, 1 = support broken (go to cash),
    /// 2 = resistance broken (fully invested).
    pub fn breakout() -> Self {
        Self::Discrete(vec![
            Target::Hold,
            Target::Allocate(0.0),
            Target::Allocate(1.0),
        ])
    }

    /// 0 = sell everything, 1 = hold, 2 = buy with everything.
    pub fn sell_hold_buy() -> Self {
        Self::Discrete(vec![
            Target::Allocate(0.0),
            Target::Hold,
            Target::Allocate(1.0),
        ])
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::Discrete(targets) = self {
            if targets.is_empty() {
                return Err(EnvError::InvalidConfig(
                    "discrete action scheme has no targets".to_string(),
                ));
            }
            for target in targets {
                if let Target::Allocate(fraction) = target {
                    check_fraction(*fraction).map_err(|_| {
                        EnvError::InvalidConfig(format!(
                            "discrete target allocation out of range: {fraction}"
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Number of discrete actions, `None` for a continuous scheme.
    pub fn num_actions(&self) -> Option<usize> {
        match self {
            Self::Discrete(targets) => Some(targets.len()),
            Self::Continuous => None,
        }
    }

    /// Target allocation for `action` given the current allocation.
    pub fn resolve(&self, action: Action, current: f64) -> Result<f64> {
        match (self, action) {
            (Self::Discrete(targets), Action::Discrete(index)) => match targets.get(index) {
                Some(Target::Hold) => Ok(current),
                Some(Target::Allocate(fraction)) => Ok(*fraction),
                None => Err(EnvError::InvalidAction(format!(
                    "discrete action {index} outside 0..{}",
                    targets.len()
                ))),
            },
            (Self::Continuous, Action::Continuous(fraction)) => check_fraction(fraction),
            (Self::Discrete(_), Action::Continuous(v)) => Err(EnvError::InvalidAction(format!(
                "continuous action {v} sent to a discrete scheme"
            ))),
            (Self::Continuous, Action::Discrete(i)) => Err(EnvError::InvalidAction(format!(
                "discrete action {i} sent to a continuous scheme"
            ))),
        }
    }
}

fn check_fraction(fraction: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(fraction)
    } else {
        Err(EnvError::InvalidAction(format!(
            "target allocation must be between 0.0 and 1.0, received: {fraction}"
        )))
    }
}

/// Transaction cost charged by the bookkeeping step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostModel {
    #[default]
    None,
    /// Fraction of the traded notional.
    Proportional { rate: f64 },
}

impl CostModel {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Proportional { rate } if (0.0..1.0).contains(rate) => Ok(()),
            Self::Proportional { rate } => Err(EnvError::InvalidConfig(format!(
                "proportional cost rate must be in [0, 1), received: {rate}"
            ))),
        }
    }

    pub fn cost(&self, traded_notional: f64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Proportional { rate } => rate * traded_notional.abs(),
        }
    }
}
