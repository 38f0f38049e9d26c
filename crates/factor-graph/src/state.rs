//! Versioned, scored candidate hypotheses.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ModelError;
use crate::graph::FactorGraph;
use crate::pattern::{FactorPattern, TemplateId};
use crate::vector::Vector;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique, monotonically increasing state identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    fn next() -> Self {
        Self(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Non-finite score classification. NaN is the more severe of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreAnomaly {
    NaN,
    Infinite,
}

impl ScoreAnomaly {
    pub fn classify(value: f64) -> Option<Self> {
        if value.is_nan() {
            Some(Self::NaN)
        } else if value.is_infinite() {
            Some(Self::Infinite)
        } else {
            None
        }
    }
}

/// Record a non-finite score. Never fails: training continues with the
/// value as set.
fn observe_score(state: StateId, kind: &'static str, value: f64) {
    match ScoreAnomaly::classify(value) {
        Some(ScoreAnomaly::NaN) => {
            tracing::error!(state = %state, kind, "Score is NaN");
        }
        Some(ScoreAnomaly::Infinite) => {
            tracing::warn!(state = %state, kind, value, "Score is infinite");
        }
        None => {}
    }
}

/// A candidate hypothesis `content` over a read-only `instance`.
///
/// The state owns its factor graph and remembers, per template, the full
/// pattern set its last scoring pass generated. `objective_score` is only
/// populated when a gold reference exists.
pub struct State<I, C> {
    id: StateId,
    parent: Option<StateId>,
    instance: Arc<I>,
    content: C,
    graph: FactorGraph,
    patterns: BTreeMap<TemplateId, Vec<FactorPattern>>,
    model_score: f64,
    objective_score: Option<f64>,
}

impl<I, C> State<I, C> {
    /// Fresh root state with an empty factor graph.
    pub fn new(instance: Arc<I>, content: C) -> Self {
        Self {
            id: StateId::next(),
            parent: None,
            instance,
            content,
            graph: FactorGraph::new(),
            patterns: BTreeMap::new(),
            model_score: 0.0,
            objective_score: None,
        }
    }

    /// Structural copy with one local edit applied.
    ///
    /// The derived state gets a new id and shares every cached factor of this
    /// state. Scores and pattern sets are reset; the scorer regenerates
    /// patterns and only computes the ones the edit introduced. Factors the
    /// edit made stale stay cached until [`compact`](State::compact).
    pub fn derive(&self, edit: impl FnOnce(&mut C)) -> Self
    where
        C: Clone,
    {
        let mut content = self.content.clone();
        edit(&mut content);
        Self {
            id: StateId::next(),
            parent: Some(self.id),
            instance: Arc::clone(&self.instance),
            content,
            graph: self.graph.clone(),
            patterns: BTreeMap::new(),
            model_score: 0.0,
            objective_score: None,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn instance_arc(&self) -> &Arc<I> {
        &self.instance
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn graph(&self) -> &FactorGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FactorGraph {
        &mut self.graph
    }

    pub fn model_score(&self) -> f64 {
        self.model_score
    }

    pub fn set_model_score(&mut self, score: f64) {
        observe_score(self.id, "model", score);
        self.model_score = score;
    }

    pub fn objective_score(&self) -> Option<f64> {
        self.objective_score
    }

    pub fn set_objective_score(&mut self, score: f64) {
        observe_score(self.id, "objective", score);
        self.objective_score = Some(score);
    }

    /// Patterns the last scoring pass generated for `template`.
    pub fn patterns(&self, template: &TemplateId) -> &[FactorPattern] {
        self.patterns.get(template).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn set_patterns(&mut self, template: TemplateId, patterns: Vec<FactorPattern>) {
        self.patterns.insert(template, patterns);
    }

    /// Templates this state has been scored with.
    pub fn scored_templates(&self) -> impl Iterator<Item = &TemplateId> {
        self.patterns.keys()
    }

    /// Drop cached factors that no recorded pattern set refers to, i.e. the
    /// ones left stale by edits since the graph was inherited. Scores are
    /// unaffected. Returns the number of factors dropped.
    pub fn compact(&mut self) -> usize {
        let live: HashSet<&FactorPattern> = self.patterns.values().flatten().collect();
        let dropped = self.graph.retain(|p| live.contains(p));
        if dropped > 0 {
            tracing::trace!(state = %self.id, dropped, remaining = self.graph.len(), "Compacted factor graph");
        }
        dropped
    }

    /// Sum of the feature vectors of this state's current factors for one
    /// template.
    pub fn feature_sum(&self, template: &TemplateId) -> Result<Vector, ModelError> {
        let mut sum = Vector::new();
        for pattern in self.patterns(template) {
            sum.add_in_place(self.graph.factor(pattern)?.features());
        }
        Ok(sum)
    }
}

impl<I, C: Clone> Clone for State<I, C> {
    /// Same identity, same shared factors.
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            parent: self.parent,
            instance: Arc::clone(&self.instance),
            content: self.content.clone(),
            graph: self.graph.clone(),
            patterns: self.patterns.clone(),
            model_score: self.model_score,
            objective_score: self.objective_score,
        }
    }
}

impl<I, C: fmt::Debug> fmt::Debug for State<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("content", &self.content)
            .field("factors", &self.graph.len())
            .field("model_score", &self.model_score)
            .field("objective_score", &self.objective_score)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_monotonic() {
        let a: State<(), u8> = State::new(Arc::new(()), 0);
        let b = a.derive(|c| *c = 1);
        let c = b.derive(|c| *c = 2);
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
        assert_eq!(c.parent(), Some(b.id()));
        assert_eq!(a.parent(), None);
    }

    #[test]
    fn test_derive_applies_edit_and_resets_scores() {
        let mut a: State<(), Vec<u8>> = State::new(Arc::new(()), vec![1, 2, 3]);
        a.set_model_score(4.0);
        a.set_objective_score(0.5);
        let b = a.derive(|c| c[1] = 9);
        assert_eq!(b.content(), &vec![1, 9, 3]);
        assert_eq!(a.content(), &vec![1, 2, 3]);
        assert_eq!(b.model_score(), 0.0);
        assert_eq!(b.objective_score(), None);
    }

    #[test]
    fn test_non_finite_scores_are_kept() {
        let mut a: State<(), ()> = State::new(Arc::new(()), ());
        a.set_model_score(f64::NAN);
        assert!(a.model_score().is_nan());
        a.set_model_score(f64::NEG_INFINITY);
        assert_eq!(a.model_score(), f64::NEG_INFINITY);
        a.set_objective_score(f64::INFINITY);
        assert_eq!(a.objective_score(), Some(f64::INFINITY));
    }

    /// Collects the level of every event emitted while installed.
    struct Levels(Arc<std::sync::Mutex<Vec<tracing::Level>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Levels {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn test_non_finite_scores_log_by_severity() {
        use tracing_subscriber::layer::SubscriberExt;

        let levels = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Levels(Arc::clone(&levels)));
        tracing::subscriber::with_default(subscriber, || {
            let mut a: State<(), ()> = State::new(Arc::new(()), ());
            a.set_model_score(f64::NAN);
            a.set_model_score(f64::NEG_INFINITY);
            a.set_objective_score(f64::INFINITY);
            a.set_model_score(1.5);
            a.set_objective_score(0.0);
        });

        let levels = levels.lock().unwrap();
        assert_eq!(
            *levels,
            vec![tracing::Level::ERROR, tracing::Level::WARN, tracing::Level::WARN]
        );
    }

    #[test]
    fn test_classify_anomaly() {
        assert_eq!(ScoreAnomaly::classify(f64::NAN), Some(ScoreAnomaly::NaN));
        assert_eq!(ScoreAnomaly::classify(f64::INFINITY), Some(ScoreAnomaly::Infinite));
        assert_eq!(ScoreAnomaly::classify(-f64::INFINITY), Some(ScoreAnomaly::Infinite));
        assert_eq!(ScoreAnomaly::classify(0.0), None);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let a: State<(), u8> = State::new(Arc::new(()), 3);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
    }
}
