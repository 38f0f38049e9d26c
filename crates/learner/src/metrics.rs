use serde::Serialize;

use factor_graph::State;
use sampler::Chain;

/// Per-epoch training metrics with health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub instances: usize,
    /// Mean objective score of each chain's final state.
    pub mean_objective: f64,
    /// Mean model score of each chain's final state.
    pub mean_model_score: f64,
    /// Chains whose final state reached a perfect objective.
    pub perfect: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub updates: usize,
}

impl EpochMetrics {
    pub fn acceptance_rate(&self) -> f64 {
        let steps = self.accepted + self.rejected;
        if steps == 0 {
            0.0
        } else {
            self.accepted as f64 / steps as f64
        }
    }

    /// Human-readable warnings for degenerate epochs. Empty when healthy.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.mean_model_score.is_finite() {
            warnings.push(format!("mean model score is {}", self.mean_model_score));
        }
        if !self.mean_objective.is_finite() {
            warnings.push(format!("mean objective is {}", self.mean_objective));
        }
        if self.instances > 0 && self.accepted == 0 {
            warnings.push("no step was accepted; chains never left their initial states".to_string());
        }
        if self.instances > 0 && self.updates == 0 && self.perfect < self.instances {
            warnings.push("no weight updates while some chains stayed imperfect".to_string());
        }
        warnings
    }
}

impl std::fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "objective={:.4} model={:.4} perfect={}/{} accept={:.2} updates={}",
            self.mean_objective,
            self.mean_model_score,
            self.perfect,
            self.instances,
            self.acceptance_rate(),
            self.updates
        )
    }
}

/// Running sums over the chains of one epoch.
#[derive(Debug, Default)]
pub(crate) struct EpochAccumulator {
    objective: f64,
    model: f64,
    perfect: usize,
    accepted: usize,
    rejected: usize,
    updates: usize,
    count: usize,
}

impl EpochAccumulator {
    pub(crate) fn update<I, C>(&mut self, chain: &Chain<I, C>) {
        if let Some(last) = chain.last() {
            let objective = last.objective_score().unwrap_or(0.0);
            self.objective += objective;
            self.model += last.model_score();
            if objective == sampler::PERFECT_SCORE {
                self.perfect += 1;
            }
        }
        self.accepted += chain.accepted;
        self.rejected += chain.rejected;
        self.updates += chain.updates;
        self.count += 1;
    }

    pub(crate) fn finish(&self, epoch: usize) -> EpochMetrics {
        let n = self.count.max(1) as f64;
        EpochMetrics {
            epoch,
            instances: self.count,
            mean_objective: self.objective / n,
            mean_model_score: self.model / n,
            perfect: self.perfect,
            accepted: self.accepted,
            rejected: self.rejected,
            updates: self.updates,
        }
    }
}

/// Mean model score of a set of predictions; `None` if empty.
pub fn mean_model_score<I, C>(states: &[State<I, C>]) -> Option<f64> {
    if states.is_empty() {
        return None;
    }
    Some(states.iter().map(State::model_score).sum::<f64>() / states.len() as f64)
}
