//! Integration tests for the sampler crate using the toy tagging task from
//! `sampler::mocks`.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use factor_graph::{FactorPattern, Model, State, Template, TemplateId, Variable, Vector, Weights};
use sampler::mocks::{
    labels, tagging_model, tagging_sampler, AllOutside, Labels, RelabelExplorer, Sentence, TagF1,
};
use sampler::{
    AcceptKind, BeamSampler, Greedy, Initializer, Learner, PolicyConfig, Sampler, SamplerConfig, SamplerError,
    SamplingKind, SamplingStrategy, ScoreKind, StateScores, StoppingKind,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rng() -> StdRng {
    StdRng::seed_from_u64(11)
}

fn sentence(text: &str) -> State<Sentence, Labels> {
    AllOutside.initial_state(Arc::new(Sentence::new(text)))
}

/// Weights under which `alice visited paris` is best labeled `PER O LOC`.
fn primed_model() -> Model<Sentence, Labels> {
    let m = tagging_model().unwrap();
    m.emission
        .weights()
        .replace(Vector::from_pairs([("w=alice&y=PER", 1.0), ("w=paris&y=LOC", 1.0)]));
    m.model
}

fn config(max_steps: usize) -> SamplerConfig {
    SamplerConfig {
        max_steps,
        ..Default::default()
    }
}

/// One factor per token whose features ignore the label, so every relabeling
/// has the same feature multiset.
struct LabelBlind {
    id: TemplateId,
    weights: Weights,
}

impl Template<Sentence, Labels> for LabelBlind {
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
            .map(|(i, label)| FactorPattern::ordered(&self.id, [Variable::Index(i), Variable::from(label.as_str())]))
            .collect()
    }

    fn compute_factor(&self, _instance: &Sentence, _pattern: &FactorPattern) -> Vector {
        Vector::from_pairs(["e", "d", "c", "b", "a"].map(|k| (k, 1.0)))
    }
}

/// Counts calls; optionally nudges one weight so every call is an update.
struct CountingLearner {
    calls: usize,
    nudge: bool,
    fail: bool,
}

impl CountingLearner {
    fn new() -> Self {
        Self {
            calls: 0,
            nudge: false,
            fail: false,
        }
    }
}

impl Learner<Sentence, Labels> for CountingLearner {
    fn update(
        &mut self,
        model: &Model<Sentence, Labels>,
        _candidate: &State<Sentence, Labels>,
        _current: &State<Sentence, Labels>,
    ) -> anyhow::Result<bool> {
        self.calls += 1;
        if self.fail {
            anyhow::bail!("learner exploded");
        }
        if self.nudge {
            model.template("emission")?.weights().update(|v| {
                let mut next = v.clone();
                next.add_to("y=PER", 0.25);
                next
            });
        }
        Ok(self.nudge)
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

#[test]
fn test_greedy_inference_climbs_to_best_labeling() {
    let sampler = tagging_sampler(primed_model(), config(5)).unwrap();
    let chain = sampler.infer_chain(sentence("alice visited paris"), &mut rng()).unwrap();

    let last = chain.last().unwrap();
    assert_eq!(last.content(), &labels("PER O LOC"));
    assert_eq!(last.model_score(), 2.0);
    assert_eq!(last.objective_score(), None);
    assert_eq!(chain.accepted, 2);
    assert_eq!(chain.rejected, 3);
    assert_eq!(chain.stopped_at, 5);
    assert_eq!(chain.len(), 6);
    assert_eq!(chain.visited().len(), 3);
}

#[test]
fn test_accepted_states_drop_stale_factors() {
    let sampler = tagging_sampler(primed_model(), config(5)).unwrap();
    let chain = sampler.infer_chain(sentence("alice visited paris"), &mut rng()).unwrap();
    assert_eq!(chain.accepted, 2);
    // Three emissions plus two transitions per state, however many edits led there.
    for state in &chain.states {
        assert_eq!(state.graph().len(), 5, "{}", state.id());
    }
}

#[test]
fn test_chain_scores_match_from_scratch() {
    let sampler = tagging_sampler(primed_model(), config(4)).unwrap();
    let chain = sampler.infer_chain(sentence("paris welcomed alice"), &mut rng()).unwrap();
    for state in &chain.states {
        let fresh = sampler.scorer().score_from_scratch(sampler.model(), state).unwrap();
        assert!((fresh - state.model_score()).abs() < 1e-9, "state {}", state.id());
    }
}

#[test]
fn test_inference_with_objective_policy_is_rejected() {
    let cfg = SamplerConfig {
        inference: PolicyConfig {
            sampling: SamplingKind::GreedyObjective,
            accept: AcceptKind::StrictModel,
            stopping: StoppingKind::MaxSteps,
        },
        ..config(3)
    };
    let sampler = tagging_sampler(primed_model(), cfg).unwrap();
    let err = sampler.infer_chain(sentence("bob saw rome"), &mut rng()).unwrap_err();
    assert!(matches!(
        err,
        SamplerError::ObjectiveWithoutGold {
            policy: "greedy-objective"
        }
    ));
}

#[test]
fn test_empty_candidate_set_counts_as_rejected() {
    let sampler = tagging_sampler(primed_model(), config(3)).unwrap();
    let chain = sampler.infer_chain(sentence(""), &mut rng()).unwrap();
    assert_eq!(chain.accepted, 0);
    assert_eq!(chain.rejected, 3);
    assert_eq!(chain.stopped_at, 3);
}

#[test]
fn test_num_explorers_caps_candidates() {
    let cfg = SamplerConfig {
        num_explorers: 2,
        ..config(1)
    };
    let sampler = tagging_sampler(primed_model(), cfg).unwrap();
    assert_eq!(sampler.propose(&sentence("alice visited paris")).len(), 2);

    let unbounded = tagging_sampler(primed_model(), config(1)).unwrap();
    assert_eq!(unbounded.propose(&sentence("alice visited paris")).len(), 6);
}

#[test]
fn test_parallel_scoring_matches_sequential() {
    let parallel_cfg = SamplerConfig {
        parallel_threshold: 1,
        num_threads: 2,
        ..config(6)
    };
    let parallel = tagging_sampler(primed_model(), parallel_cfg).unwrap();
    let sequential = tagging_sampler(primed_model(), config(6)).unwrap();

    let a = parallel.infer_chain(sentence("alice visited paris"), &mut rng()).unwrap();
    let b = sequential.infer_chain(sentence("alice visited paris"), &mut rng()).unwrap();
    let contents = |c: &sampler::Chain<Sentence, Labels>| -> Vec<Labels> {
        c.states.iter().map(|s| s.content().clone()).collect()
    };
    assert_eq!(contents(&a), contents(&b));
}

// ---------------------------------------------------------------------------
// Training chains
// ---------------------------------------------------------------------------

#[test]
fn test_objective_greedy_stops_at_perfect_score() {
    let cfg = config(10);
    let sampler = tagging_sampler(tagging_model().unwrap().model, cfg.clone()).unwrap();
    let p = cfg.policies(PolicyConfig {
        sampling: SamplingKind::GreedyObjective,
        accept: AcceptKind::StrictObjective,
        stopping: StoppingKind::ObjectiveOrMaxSteps,
    });
    let gold = labels("PER O LOC");
    let mut learner = CountingLearner::new();
    let chain = sampler
        .run_chain(sentence("alice visited paris"), Some(&gold), &p, Some(&mut learner), &mut rng())
        .unwrap();

    assert_eq!(chain.stopped_at, 2);
    assert_eq!(chain.accepted, 2);
    assert_eq!(learner.calls, 2);
    assert_eq!(chain.updates, 0);
    let last = chain.last().unwrap();
    assert_eq!(last.content(), &gold);
    assert_eq!(last.objective_score(), Some(1.0));
}

#[test]
fn test_train_chain_uses_training_policies() {
    let sampler = tagging_sampler(tagging_model().unwrap().model, config(50)).unwrap();
    let gold = labels("LOC O PER");
    let mut learner = CountingLearner::new();
    let chain = sampler
        .train_chain(sentence("rome hosted bob"), &gold, &mut learner, &mut rng())
        .unwrap();

    // strict-objective never accepts a worse labeling
    let objectives: Vec<f64> = chain.states.iter().filter_map(|s| s.objective_score()).collect();
    assert_eq!(objectives.len(), chain.len());
    assert!(objectives.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(learner.calls, chain.stopped_at);
}

#[test]
fn test_updates_rescore_current_state() {
    let sampler = tagging_sampler(tagging_model().unwrap().model, config(4)).unwrap();
    let gold = labels("PER O LOC");
    let mut learner = CountingLearner {
        nudge: true,
        ..CountingLearner::new()
    };
    let chain = sampler
        .train_chain(sentence("alice visited paris"), &gold, &mut learner, &mut rng())
        .unwrap();

    assert_eq!(chain.updates, learner.calls);
    let last = chain.last().unwrap();
    let fresh = sampler.scorer().score_from_scratch(sampler.model(), last).unwrap();
    assert!((fresh - last.model_score()).abs() < 1e-9);
}

#[test]
fn test_learner_error_propagates() {
    let sampler = tagging_sampler(tagging_model().unwrap().model, config(4)).unwrap();
    let gold = labels("PER O LOC");
    let mut learner = CountingLearner {
        fail: true,
        ..CountingLearner::new()
    };
    let err = sampler
        .train_chain(sentence("alice visited paris"), &gold, &mut learner, &mut rng())
        .unwrap_err();
    assert!(matches!(err, SamplerError::Learner(_)));
    assert!(err.to_string().contains("learner exploded"));
}

#[test]
fn test_same_seed_same_chain() {
    let sampler = tagging_sampler(primed_model(), config(8)).unwrap();
    let p = sampler.config().policies(PolicyConfig {
        sampling: SamplingKind::SoftmaxModel,
        accept: AcceptKind::Always,
        stopping: StoppingKind::MaxSteps,
    });
    let run = || {
        sampler
            .run_chain(sentence("bob saw rome"), None, &p, None, &mut rng())
            .unwrap()
            .states
            .iter()
            .map(|s| s.content().clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

// ---------------------------------------------------------------------------
// Beam
// ---------------------------------------------------------------------------

#[test]
fn test_beam_inference_finds_best_labeling() {
    let sampler = tagging_sampler(primed_model(), config(5)).unwrap();
    let beam = BeamSampler::with_width(&sampler, 3);
    let result = beam.run(sentence("alice visited paris"), None, None).unwrap();
    let best = result.best().unwrap();
    assert_eq!(best.content(), &labels("PER O LOC"));
    assert!(result.states.len() <= 3);
    assert!(result
        .states
        .windows(2)
        .all(|w| w[0].model_score() >= w[1].model_score()));
}

#[test]
fn test_beam_training_reaches_gold() {
    let sampler = tagging_sampler(tagging_model().unwrap().model, config(10)).unwrap();
    let beam = BeamSampler::new(&sampler);
    assert_eq!(beam.width(), 5);
    let gold = labels("LOC O PER");
    let mut learner = CountingLearner::new();
    let result = beam
        .run(sentence("paris welcomed alice"), Some(&gold), Some(&mut learner))
        .unwrap();
    assert_eq!(result.best().unwrap().content(), &gold);
    assert_eq!(result.steps, 2);
    assert_eq!(learner.calls, 2);
}

#[test]
fn test_feature_identical_candidates_tie_exactly() {
    let blind = Arc::new(LabelBlind {
        id: TemplateId::new("blind"),
        weights: Weights::from_vector(Vector::from_pairs([
            ("a", 0.1),
            ("b", 0.2),
            ("c", 0.3),
            ("d", -0.4),
            ("e", 0.7),
        ])),
    });
    let model = Model::with_templates([blind as Arc<dyn Template<Sentence, Labels>>]).unwrap();
    let sampler = Sampler::new(
        model,
        vec![Arc::new(RelabelExplorer::default())],
        Arc::new(TagF1),
        SamplerConfig {
            parallel_threshold: 2,
            ..config(5)
        },
    )
    .unwrap();

    let mut current = sentence("one two three four five six");
    sampler.score_all(std::slice::from_mut(&mut current), None).unwrap();
    let mut candidates = sampler.propose(&current);
    assert_eq!(candidates.len(), 12);
    sampler.score_all(&mut candidates, None).unwrap();

    let reference = current.model_score().to_bits();
    for c in &candidates {
        assert_eq!(c.model_score().to_bits(), reference, "{}", c.id());
    }

    let scores: Vec<StateScores> = candidates.iter().map(StateScores::of).collect();
    let greedy = Greedy { by: ScoreKind::Model };
    assert_eq!(greedy.select(&scores, &mut rng()).unwrap(), Some(0));
}
