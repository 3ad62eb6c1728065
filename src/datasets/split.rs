//! Reproducible train/test holdouts of a single graph.
//!
//! Holdout `i` is produced by calling the splitting callback with the seed
//! `random_state + i * random_state_stride`, so the same [`HoldoutSpec`]
//! always replays the same sequence and no two holdouts share a seed.

use std::iter::FusedIterator;

use super::errors::HoldoutSpecError;
use crate::graph::{EnableOptions, SpeedupOps};

pub const DEFAULT_RANDOM_STATE: u64 = 42;
pub const DEFAULT_RANDOM_STATE_STRIDE: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldoutSpec {
    train_size: f64,
    holdouts_number: usize,
    random_state: u64,
    random_state_stride: u64,
    enable_speedup: bool,
}

impl HoldoutSpec {
    pub fn new(train_size: f64, holdouts_number: usize) -> Result<Self, HoldoutSpecError> {
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(HoldoutSpecError::TrainSize(train_size));
        }
        if holdouts_number == 0 {
            return Err(HoldoutSpecError::NoHoldouts);
        }
        Ok(Self {
            train_size,
            holdouts_number,
            random_state: DEFAULT_RANDOM_STATE,
            random_state_stride: DEFAULT_RANDOM_STATE_STRIDE,
            enable_speedup: false,
        })
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn with_random_state_stride(mut self, stride: u64) -> Self {
        self.random_state_stride = stride;
        self
    }

    pub fn with_speedup(mut self, enable_speedup: bool) -> Self {
        self.enable_speedup = enable_speedup;
        self
    }

    pub fn train_size(&self) -> f64 {
        self.train_size
    }

    pub fn holdouts_number(&self) -> usize {
        self.holdouts_number
    }

    pub fn random_state(&self) -> u64 {
        self.random_state
    }

    pub fn random_state_stride(&self) -> u64 {
        self.random_state_stride
    }

    pub fn enable_speedup(&self) -> bool {
        self.enable_speedup
    }

    /// Seed handed to the callback for holdout `index`.
    pub fn seed(&self, index: usize) -> u64 {
        self.random_state
            .wrapping_add((index as u64).wrapping_mul(self.random_state_stride))
    }
}

/// One train/test pair, owned by the caller once yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutResult<G> {
    pub index: usize,
    pub train: G,
    pub test: G,
}

impl<G> From<HoldoutResult<G>> for (usize, (G, G)) {
    fn from(h: HoldoutResult<G>) -> Self {
        (h.index, (h.train, h.test))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldoutState {
    NotStarted,
    Running,
    Exhausted,
}

/// Lazy sequence of exactly `holdouts_number` holdouts.
///
/// A callback error is yielded once and ends the sequence; later indices are
/// never produced.
pub struct Holdouts<'g, G, F> {
    base: &'g G,
    callback: F,
    spec: HoldoutSpec,
    next: usize,
    state: HoldoutState,
}

impl<'g, G, F, E> Holdouts<'g, G, F>
where
    G: SpeedupOps,
    F: FnMut(&G, f64, u64) -> Result<(G, G), E>,
{
    pub fn new(base: &'g G, callback: F, spec: HoldoutSpec) -> Self {
        Self {
            base,
            callback,
            spec,
            next: 0,
            state: HoldoutState::NotStarted,
        }
    }

    pub fn spec(&self) -> &HoldoutSpec {
        &self.spec
    }

    pub fn state(&self) -> HoldoutState {
        self.state
    }
}

impl<G, F, E> Iterator for Holdouts<'_, G, F>
where
    G: SpeedupOps,
    F: FnMut(&G, f64, u64) -> Result<(G, G), E>,
{
    type Item = Result<HoldoutResult<G>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == HoldoutState::Exhausted || self.next >= self.spec.holdouts_number {
            self.state = HoldoutState::Exhausted;
            return None;
        }
        self.state = HoldoutState::Running;

        let index = self.next;
        let seed = self.spec.seed(index);
        match (self.callback)(self.base, self.spec.train_size, seed) {
            Ok((mut train, mut test)) => {
                if self.spec.enable_speedup {
                    train.enable(EnableOptions::speedup());
                    test.enable(EnableOptions::speedup());
                }
                self.next += 1;
                if self.next == self.spec.holdouts_number {
                    self.state = HoldoutState::Exhausted;
                }
                Some(Ok(HoldoutResult { index, train, test }))
            }
            Err(e) => {
                self.state = HoldoutState::Exhausted;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.state {
            HoldoutState::Exhausted => 0,
            _ => self.spec.holdouts_number - self.next,
        };
        (remaining.min(1), Some(remaining))
    }
}

impl<G, F, E> FusedIterator for Holdouts<'_, G, F>
where
    G: SpeedupOps,
    F: FnMut(&G, f64, u64) -> Result<(G, G), E>,
{
}

pub fn iterate_holdouts<G, F, E>(base: &G, callback: F, spec: HoldoutSpec) -> Holdouts<'_, G, F>
where
    G: SpeedupOps,
    F: FnMut(&G, f64, u64) -> Result<(G, G), E>,
{
    Holdouts::new(base, callback, spec)
}
