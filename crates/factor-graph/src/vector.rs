//! Sparse named feature vectors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sparse mapping from feature name to value. Absent features read as `0.0`.
///
/// Entries are kept in name order, so every reduction (`dot`, `l2_norm`)
/// adds its terms in the same order for equal vectors and yields
/// bit-identical results.
///
/// Functional operators (`add`, `sub`, `scale`, ...) borrow their operands and
/// return a fresh vector, so any number of readers may call them on a shared
/// vector concurrently. The `*_in_place` variants are for a sole owner on a hot
/// path (optimizer state, feature accumulation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector {
    features: BTreeMap<String, f64>,
}

impl Vector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vector from `(name, value)` pairs. Repeated names are summed.
    pub fn from_pairs<K, It>(pairs: It) -> Self
    where
        K: Into<String>,
        It: IntoIterator<Item = (K, f64)>,
    {
        let mut v = Self::new();
        for (k, x) in pairs {
            v.add_to(k, x);
        }
        v
    }

    /// Value of `feature`, `0.0` if absent.
    pub fn get(&self, feature: &str) -> f64 {
        self.features.get(feature).copied().unwrap_or(0.0)
    }

    /// Set `feature` to `value`, replacing any previous value.
    pub fn set(&mut self, feature: impl Into<String>, value: f64) {
        self.features.insert(feature.into(), value);
    }

    /// Add `value` to `feature`.
    pub fn add_to(&mut self, feature: impl Into<String>, value: f64) {
        *self.features.entry(feature.into()).or_insert(0.0) += value;
    }

    /// Whether `feature` has an explicit entry.
    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains_key(feature)
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether there are no explicit entries.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// True if every stored value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.features.values().all(|&x| x == 0.0)
    }

    /// Iterate `(name, value)` entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.features.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Entries sorted by feature name.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        self.iter().collect()
    }

    /// Dot product over the shared support, summed in name order.
    pub fn dot(&self, other: &Vector) -> f64 {
        self.iter().map(|(k, x)| x * other.get(k)).sum()
    }

    /// Euclidean norm.
    pub fn l2_norm(&self) -> f64 {
        self.features.values().map(|x| x * x).sum::<f64>().sqrt()
    }

    // --- functional operators ---

    /// `self + other`.
    pub fn add(&self, other: &Vector) -> Vector {
        let mut out = self.clone();
        out.add_in_place(other);
        out
    }

    /// `self - other`.
    pub fn sub(&self, other: &Vector) -> Vector {
        let mut out = self.clone();
        out.add_scaled_in_place(other, -1.0);
        out
    }

    /// `k * self`.
    pub fn scale(&self, k: f64) -> Vector {
        self.map_values(|x| x * k)
    }

    /// Raise every stored value to `p`.
    pub fn elementwise_pow(&self, p: f64) -> Vector {
        self.map_values(|x| x.powf(p))
    }

    /// Square root of every stored value. Callers pass nonnegative vectors
    /// (second moments); a negative entry yields NaN.
    pub fn sqrt(&self) -> Vector {
        self.map_values(f64::sqrt)
    }

    /// Add `k` to every stored value. Absent features stay absent.
    pub fn shift(&self, k: f64) -> Vector {
        self.map_values(|x| x + k)
    }

    /// Elementwise `self / other` over the support of `self`.
    ///
    /// A feature absent from `other` divides by zero; optimizers shift the
    /// denominator by an epsilon before calling this.
    pub fn divide(&self, other: &Vector) -> Vector {
        Vector {
            features: self
                .features
                .iter()
                .map(|(k, &x)| (k.clone(), x / other.get(k)))
                .collect(),
        }
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> Vector {
        Vector {
            features: self
                .features
                .iter()
                .map(|(k, &x)| (k.clone(), f(x)))
                .collect(),
        }
    }

    // --- in-place operators ---

    /// `self += other`.
    pub fn add_in_place(&mut self, other: &Vector) {
        self.add_scaled_in_place(other, 1.0);
    }

    /// `self -= other`.
    pub fn sub_in_place(&mut self, other: &Vector) {
        self.add_scaled_in_place(other, -1.0);
    }

    /// `self += k * other`.
    pub fn add_scaled_in_place(&mut self, other: &Vector, k: f64) {
        for (name, x) in other.iter() {
            self.add_to(name, k * x);
        }
    }

    /// `self *= k`.
    pub fn scale_in_place(&mut self, k: f64) {
        for x in self.features.values_mut() {
            *x *= k;
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.sorted().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Vector {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
