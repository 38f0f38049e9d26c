//! Beam variant of the exploration loop.

use std::collections::HashSet;

use factor_graph::{State, StateId};

use crate::chain::ScoredState;
use crate::engine::{Learner, Sampler, SamplerError};
use crate::objective::PERFECT_SCORE;
use crate::strategy::{ScoreKind, StateScores};

/// Result of a beam run, best state first.
#[derive(Debug, Clone)]
pub struct Beam<I, C> {
    pub states: Vec<State<I, C>>,
    pub steps: usize,
    pub updates: usize,
}

impl<I, C> Beam<I, C> {
    pub fn best(&self) -> Option<&State<I, C>> {
        self.states.first()
    }
}

/// Keeps the top `beam_width` states each step instead of a single chain.
///
/// Ranks by objective when gold is given, by model score otherwise. The beam
/// is drawn from the previous beam plus all of its proposals, so the best
/// score never decreases. Stops at `max_steps`, at a perfect objective, or
/// once a step admits no new state.
pub struct BeamSampler<'s, I, C> {
    sampler: &'s Sampler<I, C>,
    width: usize,
}

impl<'s, I, C> BeamSampler<'s, I, C>
where
    I: Send + Sync,
    C: Clone + Send,
{
    pub fn new(sampler: &'s Sampler<I, C>) -> Self {
        Self {
            sampler,
            width: sampler.config().beam_width.max(1),
        }
    }

    pub fn with_width(sampler: &'s Sampler<I, C>, width: usize) -> Self {
        Self {
            sampler,
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn run(
        &self,
        initial: State<I, C>,
        gold: Option<&C>,
        mut learner: Option<&mut dyn Learner<I, C>>,
    ) -> Result<Beam<I, C>, SamplerError> {
        let by = if gold.is_some() {
            ScoreKind::Objective
        } else {
            ScoreKind::Model
        };
        let max_steps = self.sampler.config().max_steps;

        let mut beam = vec![initial];
        self.sampler.score_all(&mut beam, gold)?;
        let mut updates = 0;
        let mut step = 0;

        while step < max_steps {
            if gold.is_some() && beam[0].objective_score() == Some(PERFECT_SCORE) {
                break;
            }
            step += 1;

            let mut candidates: Vec<State<I, C>> =
                beam.iter().flat_map(|s| self.sampler.propose(s)).collect();
            self.sampler.score_all(&mut candidates, gold)?;

            let previous: HashSet<StateId> = beam.iter().map(|s| s.id()).collect();
            let leader_before = beam[0].clone();

            let mut pool = std::mem::take(&mut beam);
            pool.append(&mut candidates);
            let mut ranked = Vec::with_capacity(pool.len());
            for (index, state) in pool.iter().enumerate() {
                let scores = StateScores::of(state);
                ranked.push(ScoredState::new(index, by.get(&scores, "beam")?));
            }
            ranked.sort_by(|a, b| b.cmp(a));
            ranked.truncate(self.width);

            let mut slots: Vec<Option<State<I, C>>> = pool.into_iter().map(Some).collect();
            beam = ranked
                .iter()
                .filter_map(|r| slots[r.index].take())
                .collect();
            for state in beam.iter_mut() {
                state.compact();
            }

            if let Some(learner) = learner.as_mut() {
                if beam[0].id() != leader_before.id()
                    && learner
                        .update(self.sampler.model(), &beam[0], &leader_before)
                        .map_err(SamplerError::Learner)?
                {
                    updates += 1;
                    for state in beam.iter_mut() {
                        self.sampler.scorer().rescore(self.sampler.model(), state)?;
                    }
                }
            }

            let admitted = beam.iter().filter(|s| !previous.contains(&s.id())).count();
            tracing::debug!(
                step,
                admitted,
                best_model = beam[0].model_score(),
                best_objective = ?beam[0].objective_score(),
                "Beam step"
            );
            if admitted == 0 {
                break;
            }
        }

        Ok(Beam {
            states: beam,
            steps: step,
            updates,
        })
    }
}
