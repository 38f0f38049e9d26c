//! SampleRank: update weights whenever model and objective rank a
//! (candidate, current) pair differently.

use factor_graph::{Model, ModelError, State};
use sampler::Learner;

use crate::optimizer::Optimizer;
use crate::regularizer::L2;

/// Errors from a single SampleRank update.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Ranking needs objective scores on both states.
    #[error("State {state} has no objective score; SampleRank needs gold")]
    MissingObjective { state: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Which way the objective wants the pair reordered, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disagreement {
    /// Objective prefers the candidate, model does not.
    CandidateBetter,
    /// Objective prefers the current state, model does not.
    CurrentBetter,
}

impl Disagreement {
    /// `None` when model and objective agree (or the objective ties).
    pub fn between(
        candidate_model: f64,
        candidate_objective: f64,
        current_model: f64,
        current_objective: f64,
    ) -> Option<Self> {
        if candidate_objective > current_objective && candidate_model <= current_model {
            Some(Disagreement::CandidateBetter)
        } else if current_objective > candidate_objective && current_model <= candidate_model {
            Some(Disagreement::CurrentBetter)
        } else {
            None
        }
    }
}

/// The SampleRank learner: gradient per template is
/// `features(worse) - features(better)`, optionally L2-regularized, then
/// handed to the optimizer. Each template's new weights are published as one
/// atomic swap.
pub struct SampleRank {
    optimizer: Box<dyn Optimizer>,
    regularizer: Option<L2>,
    updates: u64,
}

impl SampleRank {
    pub fn new(optimizer: Box<dyn Optimizer>, regularizer: Option<L2>) -> Self {
        Self {
            optimizer,
            regularizer,
            updates: 0,
        }
    }

    /// Number of pairs that changed the weights so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn set_updates(&mut self, updates: u64) {
        self.updates = updates;
    }

    /// Apply one SampleRank step. Returns `true` if weights changed.
    pub fn rank_update<I, C>(
        &mut self,
        model: &Model<I, C>,
        candidate: &State<I, C>,
        current: &State<I, C>,
    ) -> Result<bool, UpdateError> {
        let objective = |s: &State<I, C>| {
            s.objective_score().ok_or_else(|| UpdateError::MissingObjective {
                state: s.id().to_string(),
            })
        };
        let direction = Disagreement::between(
            candidate.model_score(),
            objective(candidate)?,
            current.model_score(),
            objective(current)?,
        );
        let (better, worse) = match direction {
            None => return Ok(false),
            Some(Disagreement::CandidateBetter) => (candidate, current),
            Some(Disagreement::CurrentBetter) => (current, candidate),
        };

        let mut changed = false;
        for template in model.templates() {
            let id = template.id();
            let gradient = worse.feature_sum(id)?.sub(&better.feature_sum(id)?);
            if gradient.is_zero() {
                continue;
            }
            let optimizer = &mut self.optimizer;
            let regularizer = self.regularizer;
            template.weights().update(|weights| {
                let gradient = match regularizer {
                    Some(l2) => l2.apply(&gradient, weights),
                    None => gradient,
                };
                optimizer.step(id, weights, &gradient)
            });
            changed = true;
        }

        if changed {
            self.updates += 1;
            tracing::trace!(
                better = %better.id(),
                worse = %worse.id(),
                updates = self.updates,
                "SampleRank update"
            );
        }
        Ok(changed)
    }
}

impl<I, C> Learner<I, C> for SampleRank {
    fn update(
        &mut self,
        model: &Model<I, C>,
        candidate: &State<I, C>,
        current: &State<I, C>,
    ) -> anyhow::Result<bool> {
        Ok(self.rank_update(model, candidate, current)?)
    }
}

impl std::fmt::Debug for SampleRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRank")
            .field("optimizer", &self.optimizer.name())
            .field("regularizer", &self.regularizer)
            .field("updates", &self.updates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use factor_graph::{Scorer, Template, Vector};
    use sampler::mocks::{labels, EmissionTemplate, Labels, Sentence, TagF1};
    use sampler::{apply_objective, Explorer};

    use super::*;
    use crate::optimizer::Sgd;

    fn emission_only() -> (Arc<EmissionTemplate>, Model<Sentence, Labels>) {
        let emission = Arc::new(EmissionTemplate::new());
        let mut model: Model<Sentence, Labels> = Model::new();
        model.register(emission.clone()).unwrap();
        (emission, model)
    }

    /// `current` = all `O`, `candidate` = first token relabeled `PER`, both
    /// scored against gold `PER O LOC`.
    fn scored_pair(model: &Model<Sentence, Labels>) -> (State<Sentence, Labels>, State<Sentence, Labels>) {
        let instance = Arc::new(Sentence::new("alice visited paris"));
        let gold = labels("PER O LOC");
        let mut current = State::new(instance, labels("O O O"));
        let mut candidate = current.derive(|c| c[0] = "PER".to_string());
        let scorer = Scorer::default();
        scorer.score(model, std::slice::from_mut(&mut current), false).unwrap();
        scorer.score(model, std::slice::from_mut(&mut candidate), false).unwrap();
        apply_objective(&TagF1, &mut current, &gold);
        apply_objective(&TagF1, &mut candidate, &gold);
        (candidate, current)
    }

    #[test]
    fn test_disagreement() {
        use Disagreement::*;
        assert_eq!(Disagreement::between(0.0, 0.9, 1.0, 0.1), Some(CandidateBetter));
        assert_eq!(Disagreement::between(1.0, 0.9, 1.0, 0.1), Some(CandidateBetter));
        assert_eq!(Disagreement::between(2.0, 0.1, 1.0, 0.9), Some(CurrentBetter));
        assert_eq!(Disagreement::between(2.0, 0.9, 1.0, 0.1), None);
        assert_eq!(Disagreement::between(0.0, 0.5, 1.0, 0.5), None);
    }

    #[test]
    fn test_update_moves_model_toward_objective() {
        let (emission, model) = emission_only();
        emission.weights().replace(Vector::from_pairs([("y=O", 1.0)]));
        let (mut candidate, mut current) = scored_pair(&model);
        assert!(candidate.objective_score() > current.objective_score());
        assert!(candidate.model_score() <= current.model_score());
        let gap_before = current.model_score() - candidate.model_score();

        let mut learner = SampleRank::new(Box::new(Sgd::plain(0.01)), None);
        assert!(learner.rank_update(&model, &candidate, &current).unwrap());
        assert_eq!(learner.updates(), 1);

        let scorer = Scorer::default();
        scorer.rescore(&model, &mut candidate).unwrap();
        scorer.rescore(&model, &mut current).unwrap();
        let gap_after = current.model_score() - candidate.model_score();
        assert!(gap_after < gap_before, "{gap_after} !< {gap_before}");
    }

    #[test]
    fn test_agreement_leaves_weights_alone() {
        let (emission, model) = emission_only();
        emission.weights().replace(Vector::from_pairs([("y=PER", 5.0)]));
        let (candidate, current) = scored_pair(&model);
        let before = emission.weights().snapshot();

        let mut learner = SampleRank::new(Box::new(Sgd::plain(0.01)), None);
        assert!(!learner.rank_update(&model, &candidate, &current).unwrap());
        assert!(Arc::ptr_eq(&before, &emission.weights().snapshot()));
    }

    #[test]
    fn test_missing_objective_is_an_error() {
        let (_, model) = emission_only();
        let (candidate, _) = scored_pair(&model);
        let unscored = State::new(Arc::new(Sentence::new("a")), labels("O"));
        let mut learner = SampleRank::new(Box::new(Sgd::plain(0.01)), None);
        let err = learner.rank_update(&model, &candidate, &unscored).unwrap_err();
        assert!(matches!(err, UpdateError::MissingObjective { .. }));
    }

    #[test]
    fn test_regularizer_shrinks_unrelated_weights() {
        let (emission, model) = emission_only();
        emission
            .weights()
            .replace(Vector::from_pairs([("y=O", 1.0), ("w=zzz&y=LOC", 2.0)]));
        let (candidate, current) = scored_pair(&model);

        let mut learner = SampleRank::new(Box::new(Sgd::plain(0.1)), Some(L2::new(0.5)));
        learner.rank_update(&model, &candidate, &current).unwrap();
        // grad = 0.5 * 2.0; theta = 2.0 - 0.1 * 1.0
        assert!((emission.weights().snapshot().get("w=zzz&y=LOC") - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_learner_trait_wraps_errors() {
        let (_, model) = emission_only();
        let s = State::new(Arc::new(Sentence::new("a")), labels("O"));
        let proposals = sampler::mocks::RelabelExplorer::default().propose(&s);
        let mut learner = SampleRank::new(Box::new(Sgd::plain(0.01)), None);
        let learner: &mut dyn Learner<Sentence, Labels> = &mut learner;
        assert!(learner.update(&model, &proposals[0], &s).is_err());
    }
}
