use serde::{Deserialize, Serialize};

use factor_graph::Vector;

/// L2 shrinkage added to the gradient before the optimizer step:
/// `gradient += l2 * weights`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2 {
    pub coefficient: f64,
}

impl L2 {
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }

    pub fn apply(&self, gradient: &Vector, weights: &Vector) -> Vector {
        let mut out = gradient.clone();
        out.add_scaled_in_place(weights, self.coefficient);
        out
    }
}

/// Regularization as written in config files. Absent means none.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegularizerConfig {
    #[serde(default)]
    pub l2: Option<f64>,
}

impl RegularizerConfig {
    /// `None` unless the coefficient is positive.
    pub fn build(&self) -> Option<L2> {
        self.l2.filter(|&c| c > 0.0).map(L2::new)
    }

    pub fn validate(&self) {
        if let Some(c) = self.l2.filter(|&c| c < 0.0) {
            tracing::warn!(l2 = c, "Negative L2 coefficient ignored");
        }
    }
}
