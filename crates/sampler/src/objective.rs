//! Gold-derived objective scores.

use serde::Serialize;

use factor_graph::State;

/// Objective value of a perfect hypothesis.
pub const PERFECT_SCORE: f64 = 1.0;

/// Precision / recall / F1 of a hypothesis against gold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Score {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Score {
    /// Score from precision and recall; F1 is their harmonic mean (0 if both are 0).
    pub fn new(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }

    /// Score from true-positive, false-positive and false-negative counts.
    ///
    /// Nothing predicted and nothing to find is a perfect score.
    pub fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        if tp + fp + fn_ == 0 {
            return Self::perfect();
        }
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        Self::new(ratio(tp, tp + fp), ratio(tp, tp + fn_))
    }

    pub fn perfect() -> Self {
        Self::new(PERFECT_SCORE, PERFECT_SCORE)
    }

    /// Composite value written to a state's objective score.
    pub fn value(&self) -> f64 {
        self.f1
    }

    pub fn is_perfect(&self) -> bool {
        self.f1 == PERFECT_SCORE
    }

    /// Macro average; `None` for an empty slice.
    pub fn mean(scores: &[Score]) -> Option<Score> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        Some(Score {
            precision: scores.iter().map(|s| s.precision).sum::<f64>() / n,
            recall: scores.iter().map(|s| s.recall).sum::<f64>() / n,
            f1: scores.iter().map(|s| s.f1).sum::<f64>() / n,
        })
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "P={:.4} R={:.4} F1={:.4}",
            self.precision, self.recall, self.f1
        )
    }
}

/// Compares a state's content to gold. Must be pure.
pub trait ObjectiveFunction<I, C>: Send + Sync {
    fn score(&self, state: &State<I, C>, gold: &C) -> Score;
}

/// Evaluate `objective` and write the composite onto `state`.
pub fn apply_objective<I, C>(
    objective: &dyn ObjectiveFunction<I, C>,
    state: &mut State<I, C>,
    gold: &C,
) -> Score {
    let score = objective.score(state, gold);
    state.set_objective_score(score.value());
    score
}
