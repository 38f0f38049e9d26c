//! Sampling strategies: pick the next state from a scored candidate set.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use factor_graph::State;

use crate::engine::SamplerError;

/// The two scores a policy may look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateScores {
    pub model: f64,
    /// `None` when no gold reference exists.
    pub objective: Option<f64>,
}

impl StateScores {
    pub fn of<I, C>(state: &State<I, C>) -> Self {
        Self {
            model: state.model_score(),
            objective: state.objective_score(),
        }
    }

    pub fn model(model: f64) -> Self {
        Self {
            model,
            objective: None,
        }
    }

    pub fn with_objective(model: f64, objective: f64) -> Self {
        Self {
            model,
            objective: Some(objective),
        }
    }
}

/// Which score a policy ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Model,
    Objective,
}

impl ScoreKind {
    /// Extract the score, failing if an objective is needed but absent.
    pub fn get(self, scores: &StateScores, policy: &'static str) -> Result<f64, SamplerError> {
        match self {
            ScoreKind::Model => Ok(scores.model),
            ScoreKind::Objective => scores
                .objective
                .ok_or(SamplerError::ObjectiveWithoutGold { policy }),
        }
    }

    fn collect(self, candidates: &[StateScores], policy: &'static str) -> Result<Vec<f64>, SamplerError> {
        candidates.iter().map(|c| self.get(c, policy)).collect()
    }
}

/// Selects one candidate index from a scored set.
pub trait SamplingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn uses_model(&self) -> bool;
    fn uses_objective(&self) -> bool;

    /// `Ok(None)` only for an empty candidate set.
    fn select(&self, candidates: &[StateScores], rng: &mut StdRng) -> Result<Option<usize>, SamplerError>;
}

/// Index of the first maximum, so ties resolve to generation order.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, OrderedFloat<f64>)> = None;
    for (i, &v) in values.iter().enumerate() {
        let v = OrderedFloat(v);
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Indices sorted by descending value; equal values keep generation order.
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(values[i])));
    order
}

/// Inverse-CDF draw from unnormalized nonnegative weights. Falls back to a
/// uniform draw when the weights do not form a usable distribution.
pub fn sample_index(weights: &[f64], rng: &mut StdRng) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Some(rng.gen_range(0..weights.len()));
    }
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if r < cumulative {
            return Some(i);
        }
    }
    Some(weights.len() - 1)
}

/// Maximum by one score.
#[derive(Debug, Clone, Copy)]
pub struct Greedy {
    pub by: ScoreKind,
}

impl SamplingStrategy for Greedy {
    fn name(&self) -> &'static str {
        match self.by {
            ScoreKind::Model => "greedy-model",
            ScoreKind::Objective => "greedy-objective",
        }
    }

    fn uses_model(&self) -> bool {
        self.by == ScoreKind::Model
    }

    fn uses_objective(&self) -> bool {
        self.by == ScoreKind::Objective
    }

    fn select(&self, candidates: &[StateScores], _rng: &mut StdRng) -> Result<Option<usize>, SamplerError> {
        Ok(argmax(&self.by.collect(candidates, self.name())?))
    }
}

/// Uniform draw among the top `k` by model score (`k = 0` keeps all).
#[derive(Debug, Clone, Copy)]
pub struct TopKUniform {
    pub k: usize,
}

impl SamplingStrategy for TopKUniform {
    fn name(&self) -> &'static str {
        "top-k-uniform"
    }

    fn uses_model(&self) -> bool {
        true
    }

    fn uses_objective(&self) -> bool {
        false
    }

    fn select(&self, candidates: &[StateScores], rng: &mut StdRng) -> Result<Option<usize>, SamplerError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let scores = ScoreKind::Model.collect(candidates, self.name())?;
        let ranked = rank_descending(&scores);
        let keep = if self.k == 0 { ranked.len() } else { self.k.min(ranked.len()) };
        Ok(Some(ranked[rng.gen_range(0..keep)]))
    }
}

/// How scores become a probability simplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Shift so the minimum is zero, divide by the sum.
    Linear,
    /// `exp(score) / sum(exp(score))`.
    Softmax,
}

/// Draw proportionally to normalized scores, optionally restricted to the top `k`.
#[derive(Debug, Clone, Copy)]
pub struct Proportional {
    pub by: ScoreKind,
    pub normalization: Normalization,
    /// `0` keeps every candidate.
    pub top_k: usize,
}

impl Proportional {
    pub fn weights(&self, scores: &[f64]) -> Vec<f64> {
        match self.normalization {
            Normalization::Linear => {
                let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
                scores.iter().map(|s| s - min).collect()
            }
            Normalization::Softmax => {
                // Shifting by the max leaves the distribution unchanged and keeps exp finite.
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                scores.iter().map(|s| (s - max).exp()).collect()
            }
        }
    }
}

impl SamplingStrategy for Proportional {
    fn name(&self) -> &'static str {
        match (self.normalization, self.by) {
            (Normalization::Linear, ScoreKind::Model) => "linear-model",
            (Normalization::Linear, ScoreKind::Objective) => "linear-objective",
            (Normalization::Softmax, ScoreKind::Model) => "softmax-model",
            (Normalization::Softmax, ScoreKind::Objective) => "softmax-objective",
        }
    }

    fn uses_model(&self) -> bool {
        self.by == ScoreKind::Model
    }

    fn uses_objective(&self) -> bool {
        self.by == ScoreKind::Objective
    }

    fn select(&self, candidates: &[StateScores], rng: &mut StdRng) -> Result<Option<usize>, SamplerError> {
        let scores = self.by.collect(candidates, self.name())?;
        let pool: Vec<usize> = if self.top_k == 0 {
            (0..scores.len()).collect()
        } else {
            rank_descending(&scores).into_iter().take(self.top_k).collect()
        };
        let kept: Vec<f64> = pool.iter().map(|&i| scores[i]).collect();
        Ok(sample_index(&self.weights(&kept), rng).map(|j| pool[j]))
    }
}

/// Named sampling strategies, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingKind {
    GreedyModel,
    GreedyObjective,
    TopKUniform,
    LinearModel,
    LinearObjective,
    SoftmaxModel,
    SoftmaxObjective,
}

impl SamplingKind {
    /// Instantiate the strategy. `top_k` applies to the top-k and
    /// proportional variants (`0` = all candidates).
    pub fn build(self, top_k: usize) -> Box<dyn SamplingStrategy> {
        use Normalization::*;
        use ScoreKind::*;
        let proportional = |by, normalization| -> Box<dyn SamplingStrategy> {
            Box::new(Proportional {
                by,
                normalization,
                top_k,
            })
        };
        match self {
            SamplingKind::GreedyModel => Box::new(Greedy { by: Model }),
            SamplingKind::GreedyObjective => Box::new(Greedy { by: Objective }),
            SamplingKind::TopKUniform => Box::new(TopKUniform { k: top_k }),
            SamplingKind::LinearModel => proportional(Model, Linear),
            SamplingKind::LinearObjective => proportional(Objective, Linear),
            SamplingKind::SoftmaxModel => proportional(Model, Softmax),
            SamplingKind::SoftmaxObjective => proportional(Objective, Softmax),
        }
    }
}
