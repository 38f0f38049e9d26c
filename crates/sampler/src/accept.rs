//! Acceptance policies: commit to a selected candidate or repeat the current state.

use serde::{Deserialize, Serialize};

use crate::engine::SamplerError;
use crate::strategy::{ScoreKind, StateScores};

/// Decides whether the chain advances to `candidate`.
pub trait AcceptStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn uses_objective(&self) -> bool;
    fn accept(&self, candidate: &StateScores, current: &StateScores) -> Result<bool, SamplerError>;
}

/// Accept only a strict improvement of one score.
#[derive(Debug, Clone, Copy)]
pub struct StrictImprovement {
    pub by: ScoreKind,
}

impl AcceptStrategy for StrictImprovement {
    fn name(&self) -> &'static str {
        match self.by {
            ScoreKind::Model => "strict-model",
            ScoreKind::Objective => "strict-objective",
        }
    }

    fn uses_objective(&self) -> bool {
        self.by == ScoreKind::Objective
    }

    fn accept(&self, candidate: &StateScores, current: &StateScores) -> Result<bool, SamplerError> {
        let c = self.by.get(candidate, self.name())?;
        let s = self.by.get(current, self.name())?;
        Ok(c > s)
    }
}

/// Pure exploration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl AcceptStrategy for Always {
    fn name(&self) -> &'static str {
        "always"
    }

    fn uses_objective(&self) -> bool {
        false
    }

    fn accept(&self, _candidate: &StateScores, _current: &StateScores) -> Result<bool, SamplerError> {
        Ok(true)
    }
}

/// Named acceptance policies, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptKind {
    StrictModel,
    StrictObjective,
    Always,
}

impl AcceptKind {
    pub fn build(self) -> Box<dyn AcceptStrategy> {
        match self {
            AcceptKind::StrictModel => Box::new(StrictImprovement { by: ScoreKind::Model }),
            AcceptKind::StrictObjective => Box::new(StrictImprovement {
                by: ScoreKind::Objective,
            }),
            AcceptKind::Always => Box::new(Always),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_model_requires_strict_gain() {
        let a = AcceptKind::StrictModel.build();
        assert!(a.accept(&StateScores::model(2.0), &StateScores::model(1.0)).unwrap());
        assert!(!a.accept(&StateScores::model(1.0), &StateScores::model(1.0)).unwrap());
        assert!(!a.accept(&StateScores::model(0.5), &StateScores::model(1.0)).unwrap());
    }

    #[test]
    fn test_strict_objective_ignores_model() {
        let a = AcceptKind::StrictObjective.build();
        let better = StateScores::with_objective(-5.0, 0.9);
        let worse = StateScores::with_objective(5.0, 0.1);
        assert!(a.accept(&better, &worse).unwrap());
        assert!(!a.accept(&worse, &better).unwrap());
    }

    #[test]
    fn test_strict_objective_without_gold_fails() {
        let a = AcceptKind::StrictObjective.build();
        let r = a.accept(&StateScores::model(1.0), &StateScores::model(0.0));
        assert!(matches!(r, Err(SamplerError::ObjectiveWithoutGold { policy: "strict-objective" })));
    }

    #[test]
    fn test_always() {
        let a = AcceptKind::Always.build();
        assert!(a.accept(&StateScores::model(-1.0), &StateScores::model(1.0)).unwrap());
        assert!(!a.uses_objective());
    }
}
