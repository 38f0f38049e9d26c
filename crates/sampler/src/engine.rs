//! The exploration loop: propose, score, select, accept, learn, stop.

use std::sync::Arc;

use rand::rngs::StdRng;

use factor_graph::{Model, ModelError, Scorer, State};

use crate::accept::AcceptStrategy;
use crate::chain::Chain;
use crate::config::SamplerConfig;
use crate::explorer::Explorer;
use crate::objective::{apply_objective, ObjectiveFunction};
use crate::stopping::StoppingCriterion;
use crate::strategy::{SamplingStrategy, StateScores};

/// Errors that can occur while running a chain.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// Scoring failed (missing factor, unknown template).
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    /// An objective-driven policy ran without a gold reference.
    #[error("Policy {policy} needs an objective score but no gold reference was given")]
    ObjectiveWithoutGold { policy: &'static str },
    /// The weight update failed.
    #[error("Learner error: {0}")]
    Learner(#[source] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Consumes (candidate, current) pairs and updates the model's weights.
pub trait Learner<I, C> {
    /// Returns `true` if any weight changed.
    fn update(
        &mut self,
        model: &Model<I, C>,
        candidate: &State<I, C>,
        current: &State<I, C>,
    ) -> anyhow::Result<bool>;
}

/// The three policies that drive one chain.
pub struct Policies {
    pub sampling: Box<dyn SamplingStrategy>,
    pub accept: Box<dyn AcceptStrategy>,
    pub stopping: Box<dyn StoppingCriterion>,
}

impl Policies {
    /// Fail on objective-driven policies when no gold will be available.
    pub fn check_gold(&self, has_gold: bool) -> Result<(), SamplerError> {
        if has_gold {
            return Ok(());
        }
        if self.sampling.uses_objective() {
            return Err(SamplerError::ObjectiveWithoutGold {
                policy: self.sampling.name(),
            });
        }
        if self.accept.uses_objective() {
            return Err(SamplerError::ObjectiveWithoutGold {
                policy: self.accept.name(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Policies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policies")
            .field("sampling", &self.sampling.name())
            .field("accept", &self.accept.name())
            .field("stopping", &self.stopping.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Local-search driver over one model.
pub struct Sampler<I, C> {
    model: Model<I, C>,
    scorer: Scorer,
    explorers: Vec<Arc<dyn Explorer<I, C>>>,
    objective: Arc<dyn ObjectiveFunction<I, C>>,
    config: SamplerConfig,
}

impl<I, C> Sampler<I, C>
where
    I: Send + Sync,
    C: Clone + Send,
{
    pub fn new(
        model: Model<I, C>,
        explorers: Vec<Arc<dyn Explorer<I, C>>>,
        objective: Arc<dyn ObjectiveFunction<I, C>>,
        config: SamplerConfig,
    ) -> Result<Self, SamplerError> {
        config.validate();
        let scorer = config.build_scorer()?;
        Ok(Self {
            model,
            scorer,
            explorers,
            objective,
            config,
        })
    }

    pub fn model(&self) -> &Model<I, C> {
        &self.model
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn objective(&self) -> &dyn ObjectiveFunction<I, C> {
        self.objective.as_ref()
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Union of every explorer's proposals, capped at `num_explorers`.
    pub fn propose(&self, state: &State<I, C>) -> Vec<State<I, C>> {
        let mut candidates: Vec<State<I, C>> =
            self.explorers.iter().flat_map(|e| e.propose(state)).collect();
        if self.config.num_explorers > 0 {
            candidates.truncate(self.config.num_explorers);
        }
        candidates
    }

    /// Model-score every state, and objective-score it when gold is given.
    pub fn score_all(&self, states: &mut [State<I, C>], gold: Option<&C>) -> Result<(), SamplerError> {
        self.scorer.score(&self.model, states, true)?;
        if let Some(gold) = gold {
            for state in states.iter_mut() {
                apply_objective(self.objective.as_ref(), state, gold);
            }
        }
        Ok(())
    }

    /// Training chain: objective-aware policies from the config, with
    /// `learner` consulted on every selected candidate.
    pub fn train_chain(
        &self,
        initial: State<I, C>,
        gold: &C,
        learner: &mut dyn Learner<I, C>,
        rng: &mut StdRng,
    ) -> Result<Chain<I, C>, SamplerError> {
        let policies = self.config.training_policies();
        self.run_chain(initial, Some(gold), &policies, Some(learner), rng)
    }

    /// Inference chain: model-only policies from the config, weights frozen.
    pub fn infer_chain(&self, initial: State<I, C>, rng: &mut StdRng) -> Result<Chain<I, C>, SamplerError> {
        let policies = self.config.inference_policies();
        self.run_chain(initial, None, &policies, None, rng)
    }

    /// Run one chain from `initial` until `policies.stopping` fires.
    pub fn run_chain(
        &self,
        initial: State<I, C>,
        gold: Option<&C>,
        policies: &Policies,
        mut learner: Option<&mut dyn Learner<I, C>>,
        rng: &mut StdRng,
    ) -> Result<Chain<I, C>, SamplerError> {
        policies.check_gold(gold.is_some())?;

        let mut current = initial;
        self.score_all(std::slice::from_mut(&mut current), gold)?;

        let mut history = vec![StateScores::of(&current)];
        let mut chain = Chain {
            states: vec![current.clone()],
            accepted: 0,
            rejected: 0,
            updates: 0,
            stopped_at: 0,
        };

        let mut step = 0;
        while !policies.stopping.should_stop(&history, step) {
            step += 1;

            let mut candidates = self.propose(&current);
            self.score_all(&mut candidates, gold)?;
            let scores: Vec<StateScores> = candidates.iter().map(StateScores::of).collect();

            let outcome = match policies.sampling.select(&scores, rng)? {
                None => {
                    chain.rejected += 1;
                    "empty"
                }
                Some(index) => {
                    let candidate = candidates.swap_remove(index);
                    let accepted = policies
                        .accept
                        .accept(&scores[index], &StateScores::of(&current))?;

                    let mut updated = false;
                    if let Some(learner) = learner.as_mut() {
                        updated = learner
                            .update(&self.model, &candidate, &current)
                            .map_err(SamplerError::Learner)?;
                    }

                    if accepted {
                        current = candidate;
                        current.compact();
                        chain.accepted += 1;
                    } else {
                        chain.rejected += 1;
                    }
                    if updated {
                        chain.updates += 1;
                        self.scorer.rescore(&self.model, &mut current)?;
                    }
                    if accepted {
                        "accepted"
                    } else {
                        "rejected"
                    }
                }
            };

            tracing::debug!(
                step,
                outcome,
                candidates = scores.len(),
                state = %current.id(),
                model = current.model_score(),
                objective = ?current.objective_score(),
                "Sampler step"
            );

            history.push(StateScores::of(&current));
            chain.states.push(current.clone());
        }
        chain.stopped_at = step;

        tracing::debug!(
            steps = step,
            accepted = chain.accepted,
            rejected = chain.rejected,
            updates = chain.updates,
            model = current.model_score(),
            objective = ?current.objective_score(),
            stopping = policies.stopping.name(),
            "Chain stopped"
        );
        Ok(chain)
    }
}

impl<I, C> std::fmt::Debug for Sampler<I, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("model", &self.model)
            .field("explorers", &self.explorers.len())
            .field("config", &self.config)
            .finish()
    }
}
