//! Model scores as weighted feature sums over a state's factors.

use std::sync::Arc;

use crate::error::ModelError;
use crate::model::{Model, WeightsSnapshot};
use crate::pool::WorkerPool;
use crate::state::State;
use crate::template::apply_to;

/// Computes `sum over factors of features · weights(owning template)`.
///
/// One weight snapshot is taken per call, so every state scored in a batch
/// sees the same weights even if a writer publishes an update meanwhile.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    pool: WorkerPool,
}

impl Scorer {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Extend each state's factor graph with every template and set its model
    /// score. With `parallel` set, states fan out over the pool when the batch
    /// is large enough; the call returns once all of them are scored.
    pub fn score<I, C>(
        &self,
        model: &Model<I, C>,
        states: &mut [State<I, C>],
        parallel: bool,
    ) -> Result<(), ModelError>
    where
        I: Send + Sync,
        C: Send,
    {
        let weights = model.snapshot();
        let score_one = |state: &mut State<I, C>| -> Result<(), ModelError> {
            for template in model.templates() {
                apply_to(template.as_ref(), state, false, &self.pool);
            }
            let score = weighted_sum(state, &weights)?;
            state.set_model_score(score);
            Ok(())
        };
        if parallel {
            self.pool.try_for_each_mut(states, score_one)
        } else {
            states.iter_mut().try_for_each(score_one)
        }
    }

    /// Re-sum an already scored state against the current weights. No factor
    /// is recomputed; used after a weight update.
    pub fn rescore<I, C>(&self, model: &Model<I, C>, state: &mut State<I, C>) -> Result<f64, ModelError> {
        let score = weighted_sum(state, &model.snapshot())?;
        state.set_model_score(score);
        Ok(score)
    }

    /// Score `state` on a fresh graph with every factor recomputed. Must agree
    /// with the incremental score; the state itself is left untouched.
    pub fn score_from_scratch<I, C>(&self, model: &Model<I, C>, state: &State<I, C>) -> Result<f64, ModelError>
    where
        I: Sync,
        C: Clone,
    {
        let mut fresh = State::new(Arc::clone(state.instance_arc()), state.content().clone());
        for template in model.templates() {
            apply_to(template.as_ref(), &mut fresh, true, &self.pool);
        }
        weighted_sum(&fresh, &model.snapshot())
    }
}

/// Sum every current factor of `state` against its template's weights.
///
/// Fails with [`ModelError::MissingFactor`] if a recorded pattern has no
/// factor in the graph, and with [`ModelError::UnknownTemplate`] if the
/// state was scored by a template missing from `weights`.
pub fn weighted_sum<I, C>(state: &State<I, C>, weights: &WeightsSnapshot) -> Result<f64, ModelError> {
    let mut total = 0.0;
    for template in state.scored_templates() {
        let w = weights
            .get(template)
            .ok_or_else(|| ModelError::UnknownTemplate(template.to_string()))?;
        for pattern in state.patterns(template) {
            total += state.graph().factor(pattern)?.score(w);
        }
    }
    Ok(total)
}
