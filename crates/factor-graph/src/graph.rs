//! Per-state factor cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ModelError;
use crate::factor::Factor;
use crate::pattern::FactorPattern;

/// Index of a factor in a graph's slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactorId(usize);

impl FactorId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pattern → factor cache owned by one state.
///
/// Factors live in a flat slot table of `Arc<Factor>` and patterns map to
/// slot indices. Cloning the graph copies the table of pointers, so a derived
/// state references every factor its parent computed without duplicating
/// them. Entries are only ever added, replaced or dropped, never mutated.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    slots: Vec<Arc<Factor>>,
    index: HashMap<FactorPattern, FactorId>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached factors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, pattern: &FactorPattern) -> bool {
        self.index.contains_key(pattern)
    }

    /// Subset of `candidates` not already cached, deduplicated, in first-seen order.
    pub fn new_patterns(&self, candidates: &[FactorPattern]) -> Vec<FactorPattern> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|p| !self.index.contains_key(*p) && seen.insert(*p))
            .cloned()
            .collect()
    }

    /// Insert a computed factor. If its pattern is already cached the slot is
    /// replaced with the new factor.
    pub fn insert(&mut self, factor: Factor) -> FactorId {
        let factor = Arc::new(factor);
        match self.index.get(factor.pattern()) {
            Some(&id) => {
                self.slots[id.0] = factor;
                id
            }
            None => {
                let id = FactorId(self.slots.len());
                self.index.insert(factor.pattern().clone(), id);
                self.slots.push(factor);
                id
            }
        }
    }

    /// Look up the factor for `pattern`, if cached.
    pub fn get(&self, pattern: &FactorPattern) -> Option<&Arc<Factor>> {
        self.index.get(pattern).map(|id| &self.slots[id.0])
    }

    /// Look up the factor for `pattern`, failing with
    /// [`ModelError::MissingFactor`] if the graph never computed it.
    pub fn factor(&self, pattern: &FactorPattern) -> Result<&Arc<Factor>, ModelError> {
        self.get(pattern)
            .ok_or_else(|| ModelError::MissingFactor(pattern.clone()))
    }

    pub fn by_id(&self, id: FactorId) -> Option<&Arc<Factor>> {
        self.slots.get(id.0)
    }

    /// Drop every factor whose pattern fails `keep`, preserving the order of
    /// the rest. Slot ids are reassigned. Returns the number dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&FactorPattern) -> bool) -> usize {
        let before = self.slots.len();
        self.slots.retain(|f| keep(f.pattern()));
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, f)| (f.pattern().clone(), FactorId(i)))
            .collect();
        before - self.slots.len()
    }

    /// All cached factors in insertion order.
    pub fn factors(&self) -> impl Iterator<Item = &Arc<Factor>> {
        self.slots.iter()
    }
}
