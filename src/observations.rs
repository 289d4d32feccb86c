use std::collections::VecDeque;

use crate::error::{EnvError, Result};
use crate::state::State;

/// Bounded window over the most recent states, oldest first.
#[derive(Debug, Clone)]
pub struct Observations {
    window_size: usize,
    states: VecDeque<State>,
}

impl Observations {
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(EnvError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            window_size,
            states: VecDeque::with_capacity(window_size),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn full(&self) -> bool {
        self.states.len() == self.window_size
    }

    /// Pushes the newest state, evicting the oldest when at capacity.
    pub fn append(&mut self, state: State) {
        if self.states.len() >= self.window_size {
            self.states.pop_front();
        }
        self.states.push_back(state);
    }

    /// Negative indices count back from the newest state.
    pub fn get(&self, index: isize) -> Result<&State> {
        let len = self.states.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|&i| i < len)
        };
        resolved
            .and_then(|i| self.states.get(i))
            .ok_or(EnvError::IndexOutOfRange { index, len })
    }

    pub fn last(&self) -> Option<&State> {
        self.states.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}

impl<'a> IntoIterator for &'a Observations {
    type Item = &'a State;
    type IntoIter = std::collections::vec_deque::Iter<'a, State>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}
