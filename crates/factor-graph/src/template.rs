//! Feature templates and their shared weights.

use std::sync::{Arc, RwLock};

use crate::factor::Factor;
use crate::pattern::{FactorPattern, TemplateId};
use crate::pool::WorkerPool;
use crate::state::State;
use crate::vector::Vector;

/// A template's weight vector, shared by every factor it produces across all
/// states and training steps.
///
/// Readers take an immutable [`snapshot`](Weights::snapshot); the single
/// writer swaps in a whole new vector under the write lock, so no partial
/// update is ever visible.
#[derive(Debug, Default)]
pub struct Weights {
    current: RwLock<Arc<Vector>>,
}

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vector(vector: Vector) -> Self {
        Self {
            current: RwLock::new(Arc::new(vector)),
        }
    }

    /// Current weights. Later updates do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Vector> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the weights wholesale.
    pub fn replace(&self, vector: Vector) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(vector);
    }

    /// Compute new weights from the current ones and publish them as one
    /// atomic swap. Concurrent updates are serialized.
    pub fn update(&self, f: impl FnOnce(&Vector) -> Vector) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = f(&guard);
        *guard = Arc::new(next);
    }
}

/// A feature family.
///
/// Both methods must be pure: `generate_patterns` depends only on the state's
/// content (never on what its graph already holds), and `compute_factor`
/// depends only on the instance and the pattern. Anything that can influence
/// a score must therefore be encoded in the pattern's variables.
pub trait Template<I, C>: Send + Sync {
    /// Stable name; also the weights file name.
    fn id(&self) -> &TemplateId;

    fn weights(&self) -> &Weights;

    /// Every pattern that applies to `state`.
    fn generate_patterns(&self, state: &State<I, C>) -> Vec<FactorPattern>;

    /// Feature vector for one pattern.
    fn compute_factor(&self, instance: &I, pattern: &FactorPattern) -> Vector;
}

/// Apply `template` to `state`, extending its factor graph.
///
/// Generates the full pattern set, diffs it against the graph, computes
/// factors for the new patterns only (or for all of them when `force` is
/// set) and inserts them. Pattern computations are independent and fan out
/// over `pool`. Returns the full pattern set, old and new, which is also
/// recorded on the state for scoring.
pub fn apply_to<I, C, T>(
    template: &T,
    state: &mut State<I, C>,
    force: bool,
    pool: &WorkerPool,
) -> Vec<FactorPattern>
where
    I: Sync,
    T: Template<I, C> + ?Sized,
{
    let mut patterns = template.generate_patterns(state);
    dedup_in_order(&mut patterns);
    debug_assert!(
        patterns.iter().all(|p| p.template() == template.id()),
        "template {} generated a pattern for another template",
        template.id()
    );

    let to_compute = if force {
        patterns.clone()
    } else {
        state.graph().new_patterns(&patterns)
    };

    if !to_compute.is_empty() {
        let instance = state.instance();
        let factors = pool.map(&to_compute, |p| {
            Factor::new(p.clone(), template.compute_factor(instance, p))
        });
        let graph = state.graph_mut();
        for factor in factors {
            graph.insert(factor);
        }
    }

    tracing::trace!(
        template = %template.id(),
        state = %state.id(),
        patterns = patterns.len(),
        computed = to_compute.len(),
        "Template applied"
    );

    state.set_patterns(template.id().clone(), patterns.clone());
    patterns
}

fn dedup_in_order(patterns: &mut Vec<FactorPattern>) {
    let mut seen = std::collections::HashSet::with_capacity(patterns.len());
    patterns.retain(|p| seen.insert(p.clone()));
}
