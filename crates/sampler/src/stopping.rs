//! Stopping criteria, evaluated after every step.

use serde::{Deserialize, Serialize};

use crate::objective::PERFECT_SCORE;
use crate::strategy::StateScores;

/// Decides whether the chain terminates.
///
/// `chain` holds the scores of every state so far (the initial state first,
/// one entry per step after it) and `step` is the index of the latest entry.
pub trait StoppingCriterion: Send + Sync {
    fn name(&self) -> &'static str;
    fn should_stop(&self, chain: &[StateScores], step: usize) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct MaxSteps {
    pub max_steps: usize,
}

impl StoppingCriterion for MaxSteps {
    fn name(&self) -> &'static str {
        "max-steps"
    }

    fn should_stop(&self, _chain: &[StateScores], step: usize) -> bool {
        step >= self.max_steps
    }
}

/// Stop once the latest objective is exactly perfect, or at the step limit.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveOrMaxSteps {
    pub max_steps: usize,
}

impl StoppingCriterion for ObjectiveOrMaxSteps {
    fn name(&self) -> &'static str {
        "objective-or-max-steps"
    }

    fn should_stop(&self, chain: &[StateScores], step: usize) -> bool {
        let reached = chain
            .last()
            .and_then(|s| s.objective)
            .is_some_and(|o| o == PERFECT_SCORE);
        reached || step >= self.max_steps
    }
}

/// Stop after `patience` consecutive steps without a model-score change, or
/// at the step limit.
#[derive(Debug, Clone, Copy)]
pub struct NoModelChange {
    pub patience: usize,
    pub max_steps: usize,
}

impl StoppingCriterion for NoModelChange {
    fn name(&self) -> &'static str {
        "no-model-change"
    }

    fn should_stop(&self, chain: &[StateScores], step: usize) -> bool {
        if step >= self.max_steps {
            return true;
        }
        if self.patience == 0 || chain.len() <= self.patience {
            return false;
        }
        let tail = &chain[chain.len() - self.patience - 1..];
        tail.windows(2).all(|w| w[0].model == w[1].model)
    }
}

/// Named stopping criteria, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoppingKind {
    MaxSteps,
    ObjectiveOrMaxSteps,
    NoModelChange,
}

impl StoppingKind {
    pub fn build(self, max_steps: usize, patience: usize) -> Box<dyn StoppingCriterion> {
        match self {
            StoppingKind::MaxSteps => Box::new(MaxSteps { max_steps }),
            StoppingKind::ObjectiveOrMaxSteps => Box::new(ObjectiveOrMaxSteps { max_steps }),
            StoppingKind::NoModelChange => Box::new(NoModelChange {
                patience,
                max_steps,
            }),
        }
    }
}
