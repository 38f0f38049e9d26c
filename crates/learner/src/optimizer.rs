//! Gradient-to-weights update rules.
//!
//! Gradients follow the loss convention: a step moves weights *against* the
//! gradient. Optimizer state (velocity, moments, step count) is kept per
//! template, so one optimizer instance serves a whole model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use factor_graph::{TemplateId, Vector};

/// Turns a gradient into new weights for one template.
pub trait Optimizer: Send {
    fn name(&self) -> &'static str;

    /// Returns the updated weights; `weights` itself is not modified.
    fn step(&mut self, template: &TemplateId, weights: &Vector, gradient: &Vector) -> Vector;
}

// ---------------------------------------------------------------------------
// SGD
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SgdSlot {
    velocity: Vector,
    t: u64,
}

/// SGD with optional momentum, Nesterov lookahead and inverse-time decay.
///
/// `lr_t = lr / (1 + decay * t)`, `v_t = momentum * v_{t-1} - lr_t * grad`,
/// then `theta += v_t`, or `theta += momentum * v_t - lr_t * grad` with
/// Nesterov. `t` counts this template's previous steps, starting at 0.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub lr: f64,
    pub momentum: f64,
    pub decay: f64,
    pub nesterov: bool,
    slots: HashMap<TemplateId, SgdSlot>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64, decay: f64, nesterov: bool) -> Self {
        Self {
            lr,
            momentum,
            decay,
            nesterov,
            slots: HashMap::new(),
        }
    }

    /// Plain SGD: no momentum, no decay.
    pub fn plain(lr: f64) -> Self {
        Self::new(lr, 0.0, 0.0, false)
    }

    /// Effective learning rate after `t` steps.
    pub fn rate_at(&self, t: u64) -> f64 {
        self.lr / (1.0 + self.decay * t as f64)
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "sgd"
    }

    fn step(&mut self, template: &TemplateId, weights: &Vector, gradient: &Vector) -> Vector {
        let lr_t = self.rate_at(self.slots.get(template).map_or(0, |s| s.t));
        let slot = self.slots.entry(template.clone()).or_default();

        slot.velocity.scale_in_place(self.momentum);
        slot.velocity.add_scaled_in_place(gradient, -lr_t);
        slot.t += 1;

        let mut next = weights.clone();
        if self.nesterov {
            next.add_scaled_in_place(&slot.velocity, self.momentum);
            next.add_scaled_in_place(gradient, -lr_t);
        } else {
            next.add_in_place(&slot.velocity);
        }
        next
    }
}

// ---------------------------------------------------------------------------
// Adam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct AdamSlot {
    m: Vector,
    v: Vector,
    t: i32,
}

/// Adam with bias correction folded into the step size:
/// `alpha_t = alpha * sqrt(1 - beta2^t) / (1 - beta1^t)`,
/// `theta -= alpha_t * m_t / (sqrt(v_t) + epsilon)`.
#[derive(Debug, Clone)]
pub struct Adam {
    pub alpha: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    slots: HashMap<TemplateId, AdamSlot>,
}

impl Adam {
    pub fn new(alpha: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            alpha,
            beta1,
            beta2,
            epsilon,
            slots: HashMap::new(),
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(default_alpha(), default_beta1(), default_beta2(), default_epsilon())
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn step(&mut self, template: &TemplateId, weights: &Vector, gradient: &Vector) -> Vector {
        let slot = self.slots.entry(template.clone()).or_default();
        slot.t = slot.t.saturating_add(1);

        slot.m.scale_in_place(self.beta1);
        slot.m.add_scaled_in_place(gradient, 1.0 - self.beta1);
        slot.v.scale_in_place(self.beta2);
        slot.v.add_scaled_in_place(&gradient.elementwise_pow(2.0), 1.0 - self.beta2);

        let alpha_t =
            self.alpha * (1.0 - self.beta2.powi(slot.t)).sqrt() / (1.0 - self.beta1.powi(slot.t));
        // m and v share a support, so the denominator is defined for every entry of m.
        let direction = slot.m.divide(&slot.v.sqrt().shift(self.epsilon));

        let mut next = weights.clone();
        next.add_scaled_in_place(&direction, -alpha_t);
        next
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Optimizer selection as written in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OptimizerConfig {
    Sgd {
        #[serde(default = "default_lr")]
        lr: f64,
        #[serde(default)]
        momentum: f64,
        #[serde(default)]
        decay: f64,
        #[serde(default)]
        nesterov: bool,
    },
    Adam {
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
}

fn default_lr() -> f64 {
    0.01
}
fn default_alpha() -> f64 {
    0.001
}
fn default_beta1() -> f64 {
    0.9
}
fn default_beta2() -> f64 {
    0.999
}
fn default_epsilon() -> f64 {
    1e-8
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            alpha: default_alpha(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd {
                lr,
                momentum,
                decay,
                nesterov,
            } => Box::new(Sgd::new(lr, momentum, decay, nesterov)),
            OptimizerConfig::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(alpha, beta1, beta2, epsilon)),
        }
    }

    /// Log a warning for hyperparameters outside their usual ranges.
    pub fn validate(&self) {
        match *self {
            OptimizerConfig::Sgd { lr, momentum, decay, .. } => {
                if lr <= 0.0 {
                    tracing::warn!(lr, "SGD learning rate is not positive; weights will not move toward agreement");
                }
                if !(0.0..1.0).contains(&momentum) {
                    tracing::warn!(momentum, "SGD momentum outside [0, 1)");
                }
                if decay < 0.0 {
                    tracing::warn!(decay, "Negative decay grows the learning rate over time");
                }
            }
            OptimizerConfig::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
            } => {
                if alpha <= 0.0 {
                    tracing::warn!(alpha, "Adam step size is not positive");
                }
                if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                    tracing::warn!(beta1, beta2, "Adam betas outside [0, 1)");
                }
                if epsilon <= 0.0 {
                    tracing::warn!(epsilon, "Adam epsilon must be positive to guard the division");
                }
            }
        }
    }
}
