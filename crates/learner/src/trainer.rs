//! SampleRank training loop over a labeled corpus.
//!
//! Each epoch runs one training chain per document, in (optionally shuffled)
//! order, with the SampleRank learner updating the shared template weights
//! after every step. Prediction runs model-only chains with the weights frozen.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use factor_graph::{Model, State};
use sampler::{Chain, Explorer, Initializer, ObjectiveFunction, Sampler, Score};

use crate::checkpoint::{load_checkpoint, save_checkpoint, CheckpointMeta};
use crate::config::{RunToml, TrainerConfig};
use crate::metrics::{mean_model_score, EpochAccumulator, EpochMetrics};
use crate::samplerank::SampleRank;

/// Hooks into the training loop. Every method defaults to a no-op.
pub trait TrainerListener<I, C> {
    fn on_epoch_start(&mut self, _epoch: usize) {}

    /// Called after each document's chain; `index` is the document's
    /// position in the caller's slice, not in the shuffled order.
    fn on_instance_end(&mut self, _epoch: usize, _index: usize, _chain: &Chain<I, C>) {}

    fn on_epoch_end(&mut self, _metrics: &EpochMetrics) {}
}

/// Predictions for a labeled test set with their scores against gold.
#[derive(Debug, Clone)]
pub struct TestReport<I, C> {
    pub predictions: Vec<State<I, C>>,
    pub scores: Vec<Score>,
    /// Macro average over documents; perfect for an empty set.
    pub macro_score: Score,
    pub mean_model_score: Option<f64>,
}

pub struct Trainer<I, C> {
    sampler: Sampler<I, C>,
    initializer: Arc<dyn Initializer<I, C>>,
    learner: SampleRank,
    config: TrainerConfig,
    listeners: Vec<Box<dyn TrainerListener<I, C>>>,
    epochs_done: usize,
}

impl<I, C> Trainer<I, C>
where
    I: Send + Sync,
    C: Clone + Send,
{
    pub fn new(sampler: Sampler<I, C>, initializer: Arc<dyn Initializer<I, C>>, config: TrainerConfig) -> Self {
        config.validate();
        let learner = SampleRank::new(config.optimizer.build(), config.regularizer.build());
        Self {
            sampler,
            initializer,
            learner,
            config,
            listeners: Vec::new(),
            epochs_done: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn TrainerListener<I, C>>) {
        self.listeners.push(listener);
    }

    pub fn sampler(&self) -> &Sampler<I, C> {
        &self.sampler
    }

    pub fn model(&self) -> &Model<I, C> {
        self.sampler.model()
    }

    pub fn learner(&self) -> &SampleRank {
        &self.learner
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Epochs completed so far, including any restored from a checkpoint.
    pub fn epochs_done(&self) -> usize {
        self.epochs_done
    }

    /// Run the remaining epochs over `documents` (instance, gold) pairs.
    ///
    /// Shuffle order and chain draws are seeded per epoch, so a run resumed
    /// at epoch `k` visits documents exactly as an uninterrupted run would.
    pub fn train(&mut self, documents: &[(Arc<I>, C)]) -> anyhow::Result<Vec<EpochMetrics>> {
        let mut history = Vec::with_capacity(self.config.epochs.saturating_sub(self.epochs_done));
        let train_start = Instant::now();

        tracing::info!(
            documents = documents.len(),
            epochs = self.config.epochs,
            start_epoch = self.epochs_done,
            templates = self.model().len(),
            "Starting training"
        );

        for epoch in self.epochs_done..self.config.epochs {
            let mut order: Vec<usize> = (0..documents.len()).collect();
            if self.config.shuffle {
                order.shuffle(&mut StdRng::seed_from_u64(epoch_seed(self.config.seed, epoch)));
            }
            let mut chain_rng = StdRng::seed_from_u64(epoch_seed(self.sampler.config().seed, epoch));
            for listener in &mut self.listeners {
                listener.on_epoch_start(epoch);
            }

            let pb = self.progress_bar(documents.len(), epoch);
            let mut acc = EpochAccumulator::default();

            for &index in &order {
                let (instance, gold) = &documents[index];
                let initial = self.initializer.initial_state(Arc::clone(instance));
                let chain = self
                    .sampler
                    .train_chain(initial, gold, &mut self.learner, &mut chain_rng)?;
                acc.update(&chain);
                for listener in &mut self.listeners {
                    listener.on_instance_end(epoch, index, &chain);
                }
                pb.inc(1);
            }
            pb.finish_and_clear();

            let metrics = acc.finish(epoch);
            tracing::info!(
                epoch,
                total_updates = self.learner.updates(),
                "Epoch {epoch}: {metrics}"
            );
            let warnings = metrics.health_check();
            if !warnings.is_empty() {
                tracing::warn!(epoch, "Health check warnings: {:?}", warnings);
            }

            self.epochs_done = epoch + 1;
            if let Some(dir) = &self.config.checkpoint_dir {
                let epoch_dir = dir.join(format!("epoch_{epoch}"));
                save_checkpoint(self.model(), &epoch_dir, self.epochs_done, self.learner.updates())?;
            }

            for listener in &mut self.listeners {
                listener.on_epoch_end(&metrics);
            }
            history.push(metrics);
        }

        tracing::info!(
            epochs = history.len(),
            total_updates = self.learner.updates(),
            elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
            "Training complete"
        );
        Ok(history)
    }

    /// Final state of an inference chain per instance.
    pub fn predict(&self, instances: &[Arc<I>]) -> anyhow::Result<Vec<State<I, C>>> {
        let mut rng = StdRng::seed_from_u64(self.sampler.config().seed);
        let mut predictions = Vec::with_capacity(instances.len());
        for instance in instances {
            let initial = self.initializer.initial_state(Arc::clone(instance));
            let chain = self.sampler.infer_chain(initial, &mut rng)?;
            if let Some(last) = chain.into_last() {
                predictions.push(last);
            }
        }
        Ok(predictions)
    }

    /// Predict every document and score the predictions against gold.
    pub fn test(&self, documents: &[(Arc<I>, C)]) -> anyhow::Result<TestReport<I, C>> {
        let instances: Vec<Arc<I>> = documents.iter().map(|(i, _)| Arc::clone(i)).collect();
        let predictions = self.predict(&instances)?;
        let objective: &dyn ObjectiveFunction<I, C> = self.sampler.objective();
        let scores: Vec<Score> = predictions
            .iter()
            .zip(documents)
            .map(|(state, (_, gold))| objective.score(state, gold))
            .collect();
        let macro_score = Score::mean(&scores).unwrap_or_else(Score::perfect);

        tracing::info!(documents = documents.len(), "Test: {macro_score}");
        Ok(TestReport {
            mean_model_score: mean_model_score(&predictions),
            predictions,
            scores,
            macro_score,
        })
    }

    pub fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<CheckpointMeta> {
        save_checkpoint(self.model(), dir, self.epochs_done, self.learner.updates())
    }

    /// Restore weights and progress counters from a checkpoint. Optimizer
    /// state (momentum, moments) starts fresh.
    pub fn resume(&mut self, dir: &Path) -> anyhow::Result<CheckpointMeta> {
        let meta = load_checkpoint(self.model(), dir)?;
        self.epochs_done = meta.epoch;
        self.learner.set_updates(meta.total_updates);
        tracing::info!(epoch = meta.epoch, total_updates = meta.total_updates, "Resumed training from checkpoint");
        Ok(meta)
    }

    fn progress_bar(&self, len: usize, epoch: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(format!("epoch {epoch}"));
        pb
    }
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed.wrapping_add(epoch as u64)
}

/// Train `model` on `documents` with the settings in `run`, returning the
/// model whose templates now hold the trained weights.
pub fn train<I, C>(
    model: Model<I, C>,
    explorers: Vec<Arc<dyn Explorer<I, C>>>,
    objective: Arc<dyn ObjectiveFunction<I, C>>,
    initializer: Arc<dyn Initializer<I, C>>,
    documents: &[(Arc<I>, C)],
    run: &RunToml,
) -> anyhow::Result<Model<I, C>>
where
    I: Send + Sync,
    C: Clone + Send,
{
    let sampler = Sampler::new(model, explorers, objective, run.sampler.clone())?;
    let mut trainer = Trainer::new(sampler, initializer, run.trainer.clone());
    trainer.train(documents)?;
    Ok(trainer.model().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampler::mocks::{tagging_model, tagging_sampler, toy_corpus, AllOutside};
    use sampler::SamplerConfig;

    fn trainer(epochs: usize) -> Trainer<sampler::mocks::Sentence, sampler::mocks::Labels> {
        let sampler = tagging_sampler(
            tagging_model().unwrap().model,
            SamplerConfig {
                max_steps: 20,
                ..Default::default()
            },
        )
        .unwrap();
        Trainer::new(
            sampler,
            Arc::new(AllOutside),
            TrainerConfig {
                epochs,
                ..Default::default()
            },
        )
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl<I, C> TrainerListener<I, C> for Recorder {
        fn on_epoch_start(&mut self, epoch: usize) {
            self.events.lock().unwrap().push(format!("start {epoch}"));
        }

        fn on_instance_end(&mut self, epoch: usize, index: usize, _chain: &Chain<I, C>) {
            self.events.lock().unwrap().push(format!("doc {epoch}/{index}"));
        }

        fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
            self.events.lock().unwrap().push(format!("end {}", metrics.epoch));
        }
    }

    #[test]
    fn test_listener_sees_every_document() {
        let corpus = toy_corpus();
        let mut t = trainer(2);
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        t.add_listener(Box::new(Recorder {
            events: Arc::clone(&events),
        }));
        let history = t.train(&corpus).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(t.epochs_done(), 2);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2 * (corpus.len() + 2));
        assert_eq!(events.first().map(String::as_str), Some("start 0"));
        assert_eq!(events.last().map(String::as_str), Some("end 1"));
        for index in 0..corpus.len() {
            assert!(events.contains(&format!("doc 0/{index}")));
        }
    }

    #[test]
    fn test_zero_epochs_is_a_no_op() {
        let mut t = trainer(0);
        let history = t.train(&toy_corpus()).unwrap();
        assert!(history.is_empty());
        assert_eq!(t.learner().updates(), 0);
    }

    #[test]
    fn test_empty_test_set_is_perfect() {
        let t = trainer(1);
        let report = t.test(&[]).unwrap();
        assert!(report.macro_score.is_perfect());
        assert!(report.predictions.is_empty());
        assert_eq!(report.mean_model_score, None);
    }
}
