use ordered_float::OrderedFloat;

use factor_graph::{State, StateId};

use crate::strategy::StateScores;

/// The result of one exploration run.
///
/// `states[0]` is the initial state and `states[k]` the current state after
/// step `k`; a rejected step repeats the previous state.
#[derive(Debug, Clone)]
pub struct Chain<I, C> {
    pub states: Vec<State<I, C>>,
    /// Steps that advanced to the selected candidate.
    pub accepted: usize,
    /// Steps that repeated the current state, including steps with no candidates.
    pub rejected: usize,
    /// Steps on which the learner changed the weights.
    pub updates: usize,
    /// Step index at which the stopping criterion fired.
    pub stopped_at: usize,
}

impl<I, C> Chain<I, C> {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn initial(&self) -> Option<&State<I, C>> {
        self.states.first()
    }

    pub fn last(&self) -> Option<&State<I, C>> {
        self.states.last()
    }

    pub fn into_last(self) -> Option<State<I, C>> {
        self.states.into_iter().last()
    }

    pub fn scores(&self) -> Vec<StateScores> {
        self.states.iter().map(StateScores::of).collect()
    }

    /// Distinct states visited, in order. Repeats from rejected steps collapse.
    pub fn visited(&self) -> Vec<StateId> {
        let mut ids: Vec<StateId> = self.states.iter().map(|s| s.id()).collect();
        ids.dedup();
        ids
    }

    /// Fraction of steps that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        let steps = self.accepted + self.rejected;
        if steps == 0 {
            0.0
        } else {
            self.accepted as f64 / steps as f64
        }
    }
}

/// An index into a candidate set with the score it is ranked by.
///
/// Ordered by score; among equal scores the lower index ranks higher, so a
/// sort keeps generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredState {
    pub index: usize,
    pub score: OrderedFloat<f64>,
}

impl ScoredState {
    pub fn new(index: usize, score: f64) -> Self {
        Self {
            index,
            score: OrderedFloat(score),
        }
    }
}

impl PartialOrd for ScoredState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}
