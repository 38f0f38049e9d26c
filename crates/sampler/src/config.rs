use factor_graph::{ModelError, Scorer, WorkerPool, DEFAULT_PARALLEL_THRESHOLD};

use crate::accept::AcceptKind;
use crate::engine::Policies;
use crate::stopping::StoppingKind;
use crate::strategy::SamplingKind;

/// Named policy triple for one mode of the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PolicyConfig {
    pub sampling: SamplingKind,
    pub accept: AcceptKind,
    pub stopping: StoppingKind,
}

impl PolicyConfig {
    /// Objective-guided exploration used while learning.
    pub fn training() -> Self {
        Self {
            sampling: SamplingKind::LinearModel,
            accept: AcceptKind::StrictObjective,
            stopping: StoppingKind::ObjectiveOrMaxSteps,
        }
    }

    /// Model-only hill climbing used when no gold is available.
    pub fn inference() -> Self {
        Self {
            sampling: SamplingKind::GreedyModel,
            accept: AcceptKind::StrictModel,
            stopping: StoppingKind::MaxSteps,
        }
    }
}

/// Sampler configuration loaded from TOML.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SamplerConfig {
    /// Steps per chain before the step limit fires.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Maximum candidates kept per step (0 = keep all proposals).
    #[serde(default)]
    pub num_explorers: usize,

    /// Batch size at which candidate scoring and factor computation go parallel.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Worker threads for the scoring pool (0 = one per core).
    #[serde(default)]
    pub num_threads: usize,

    /// Pool size for `top-k-uniform` and the proportional strategies (0 = all).
    #[serde(default)]
    pub top_k: usize,

    /// Consecutive unchanged steps tolerated by `no-model-change`.
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// States kept per step by the beam sampler.
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,

    /// Seed for the chain's random draws.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "PolicyConfig::training")]
    pub training: PolicyConfig,

    #[serde(default = "PolicyConfig::inference")]
    pub inference: PolicyConfig,
}

fn default_max_steps() -> usize {
    100
}
fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}
fn default_patience() -> usize {
    10
}
fn default_beam_width() -> usize {
    5
}
fn default_seed() -> u64 {
    42
}

impl SamplerConfig {
    /// Log warnings for settings that make a chain degenerate.
    pub fn validate(&self) {
        if self.max_steps == 0 {
            tracing::warn!("max_steps = 0; chains stop after the initial state");
        }
        if self.beam_width == 0 {
            tracing::warn!("beam_width = 0; the beam sampler will keep one state");
        }
        let inference = [
            (self.inference.sampling.build(self.top_k).uses_objective(), "sampling"),
            (self.inference.accept.build().uses_objective(), "accept"),
        ];
        for (uses_objective, policy) in inference {
            if uses_objective {
                tracing::warn!(
                    policy,
                    "inference {policy} policy needs an objective; predictions will fail without gold"
                );
            }
        }
        if self.training.stopping == StoppingKind::NoModelChange && self.patience == 0 {
            tracing::warn!("no-model-change with patience = 0 only stops at max_steps");
        }
    }

    /// Worker pool sized by `num_threads` with this config's parallel threshold.
    pub fn build_pool(&self) -> Result<WorkerPool, ModelError> {
        WorkerPool::new(self.num_threads, self.parallel_threshold)
    }

    pub fn build_scorer(&self) -> Result<Scorer, ModelError> {
        Ok(Scorer::new(self.build_pool()?))
    }

    pub fn training_policies(&self) -> Policies {
        self.policies(self.training)
    }

    pub fn inference_policies(&self) -> Policies {
        self.policies(self.inference)
    }

    /// Instantiate a named policy triple with this config's limits.
    pub fn policies(&self, names: PolicyConfig) -> Policies {
        Policies {
            sampling: names.sampling.build(self.top_k),
            accept: names.accept.build(),
            stopping: names.stopping.build(self.max_steps, self.patience),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            num_explorers: 0,
            parallel_threshold: default_parallel_threshold(),
            num_threads: 0,
            top_k: 0,
            patience: default_patience(),
            beam_width: default_beam_width(),
            seed: default_seed(),
            training: PolicyConfig::training(),
            inference: PolicyConfig::inference(),
        }
    }
}
