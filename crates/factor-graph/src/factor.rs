use crate::pattern::FactorPattern;
use crate::vector::Vector;

/// A pattern together with its computed feature vector.
///
/// Immutable once built. Recomputing a pattern produces a new `Factor` that
/// replaces the old one in the graph slot; the old one is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pattern: FactorPattern,
    features: Vector,
}

impl Factor {
    pub fn new(pattern: FactorPattern, features: Vector) -> Self {
        Self { pattern, features }
    }

    pub fn pattern(&self) -> &FactorPattern {
        &self.pattern
    }

    pub fn features(&self) -> &Vector {
        &self.features
    }

    /// Weighted feature sum against the owning template's weights.
    pub fn score(&self, weights: &Vector) -> f64 {
        self.features.dot(weights)
    }
}
