//! A toy sequence-tagging task for exercising samplers and learners without a
//! real corpus.
//!
//! Instance: a tokenized sentence. Content: one label per token. Templates
//! score (token, label) emissions and (label, label) transitions; the explorer
//! relabels one token at a time; the objective is token-level F1 ignoring `O`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use factor_graph::{FactorPattern, Model, ModelError, State, Template, TemplateId, Variable, Vector, Weights};

use crate::config::SamplerConfig;
use crate::engine::{Sampler, SamplerError};
use crate::explorer::{Explorer, Initializer};
use crate::objective::{ObjectiveFunction, Score};

/// Label for tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// Label set of the toy task.
pub const LABELS: &[&str] = &[OUTSIDE, "PER", "LOC"];

pub type Labels = Vec<String>;

/// A tokenized sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub tokens: Vec<String>,
}

impl Sentence {
    pub fn new(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Convenience constructor for a label sequence: `labels("PER O LOC")`.
pub fn labels(text: &str) -> Labels {
    text.split_whitespace().map(str::to_string).collect()
}

/// Four labeled sentences that a few training epochs can fit.
pub fn toy_corpus() -> Vec<(Arc<Sentence>, Labels)> {
    [
        ("alice visited paris", "PER O LOC"),
        ("bob saw rome", "PER O LOC"),
        ("paris welcomed alice", "LOC O PER"),
        ("rome hosted bob", "LOC O PER"),
    ]
    .iter()
    .map(|(text, tags)| (Arc::new(Sentence::new(text)), labels(tags)))
    .collect()
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// `(position, label)` factors with token-identity and label-bias features.
pub struct EmissionTemplate {
    id: TemplateId,
    weights: Weights,
    computed: AtomicUsize,
}

impl EmissionTemplate {
    pub fn new() -> Self {
        Self {
            id: TemplateId::new("emission"),
            weights: Weights::new(),
            computed: AtomicUsize::new(0),
        }
    }

    /// Number of factors computed so far.
    pub fn computed(&self) -> usize {
        self.computed.load(Ordering::SeqCst)
    }
}

impl Default for EmissionTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl Template<Sentence, Labels> for EmissionTemplate {
    fn id(&self) -> &TemplateId {
        &self.id
    }

    fn weights(&self) -> &Weights {
        &self.weights
    }

    fn generate_patterns(&self, state: &State<Sentence, Labels>) -> Vec<FactorPattern> {
        state
            .content()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                FactorPattern::ordered(&self.id, [Variable::Index(i), Variable::from(label.as_str())])
            })
            .collect()
    }

    fn compute_factor(&self, instance: &Sentence, pattern: &FactorPattern) -> Vector {
        self.computed.fetch_add(1, Ordering::SeqCst);
        let [Variable::Index(i), Variable::Symbol(label)] = pattern.variables() else {
            tracing::warn!(%pattern, "Unexpected emission pattern");
            return Vector::new();
        };
        let token = instance.tokens.get(*i).map_or("<oob>", String::as_str);
        Vector::from_pairs([
            (format!("w={token}&y={label}"), 1.0),
            (format!("y={label}"), 1.0),
        ])
    }
}

/// `(position, previous label, label)` factors over adjacent tokens.
pub struct TransitionTemplate {
    id: TemplateId,
    weights: Weights,
}

impl TransitionTemplate {
    pub fn new() -> Self {
        Self {
            id: TemplateId::new("transition"),
            weights: Weights::new(),
        }
    }
}

impl Default for TransitionTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl Template<Sentence, Labels> for TransitionTemplate {
    fn id(&self) -> &TemplateId {
        &self.id
    }

    fn weights(&self) -> &Weights {
        &self.weights
    }

    fn generate_patterns(&self, state: &State<Sentence, Labels>) -> Vec<FactorPattern> {
        state
            .content()
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                FactorPattern::ordered(
                    &self.id,
                    [
                        Variable::Index(i + 1),
                        Variable::from(pair[0].as_str()),
                        Variable::from(pair[1].as_str()),
                    ],
                )
            })
            .collect()
    }

    fn compute_factor(&self, _instance: &Sentence, pattern: &FactorPattern) -> Vector {
        let [_, Variable::Symbol(prev), Variable::Symbol(next)] = pattern.variables() else {
            tracing::warn!(%pattern, "Unexpected transition pattern");
            return Vector::new();
        };
        Vector::from_pairs([(format!("{prev}->{next}"), 1.0)])
    }
}

// ---------------------------------------------------------------------------
// Explorer, initializer, objective
// ---------------------------------------------------------------------------

/// Proposes every single-token relabeling.
#[derive(Debug, Clone)]
pub struct RelabelExplorer {
    labels: Vec<String>,
}

impl RelabelExplorer {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl Default for RelabelExplorer {
    fn default() -> Self {
        Self::new(LABELS)
    }
}

impl Explorer<Sentence, Labels> for RelabelExplorer {
    fn propose(&self, state: &State<Sentence, Labels>) -> Vec<State<Sentence, Labels>> {
        let mut out = Vec::new();
        for (i, current) in state.content().iter().enumerate() {
            for label in self.labels.iter().filter(|l| *l != current) {
                out.push(state.derive(|c| c[i] = label.clone()));
            }
        }
        out
    }
}

/// Labels every token `O`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllOutside;

impl Initializer<Sentence, Labels> for AllOutside {
    fn initial_state(&self, instance: Arc<Sentence>) -> State<Sentence, Labels> {
        let n = instance.len();
        State::new(instance, vec![OUTSIDE.to_string(); n])
    }
}

/// Token-level F1 over non-`O` labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagF1;

impl ObjectiveFunction<Sentence, Labels> for TagF1 {
    fn score(&self, state: &State<Sentence, Labels>, gold: &Labels) -> Score {
        let (mut tp, mut fp, mut fn_) = (0, 0, 0);
        for (pred, gold) in state.content().iter().zip(gold) {
            let pred_entity = pred != OUTSIDE;
            let gold_entity = gold != OUTSIDE;
            if pred == gold {
                if gold_entity {
                    tp += 1;
                }
                continue;
            }
            if pred_entity {
                fp += 1;
            }
            if gold_entity {
                fn_ += 1;
            }
        }
        Score::from_counts(tp, fp, fn_)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Handles to the two templates plus the model registering them.
pub struct TaggingModel {
    pub emission: Arc<EmissionTemplate>,
    pub transition: Arc<TransitionTemplate>,
    pub model: Model<Sentence, Labels>,
}

pub fn tagging_model() -> Result<TaggingModel, ModelError> {
    let emission = Arc::new(EmissionTemplate::new());
    let transition = Arc::new(TransitionTemplate::new());
    let model = Model::with_templates([
        emission.clone() as Arc<dyn Template<Sentence, Labels>>,
        transition.clone() as Arc<dyn Template<Sentence, Labels>>,
    ])?;
    Ok(TaggingModel {
        emission,
        transition,
        model,
    })
}

/// A sampler over `model` with the relabel explorer and tag F1.
pub fn tagging_sampler(
    model: Model<Sentence, Labels>,
    config: SamplerConfig,
) -> Result<Sampler<Sentence, Labels>, SamplerError> {
    Sampler::new(
        model,
        vec![Arc::new(RelabelExplorer::default())],
        Arc::new(TagF1),
        config,
    )
}
