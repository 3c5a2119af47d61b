//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::config::TrainingConfig;
use crate::corpus::{Corpus, Document};
use crate::diagnostics::Diagnostics;
use crate::dispersion::DispersionWeights;
use crate::enums::TrainingError;
use crate::hyper::{AlphaOptimizer, HyperparameterScheduler, MinkaFixedPoint};
use crate::io::TrainingSnapshot;
use crate::sampler::{CountMass, GibbsSampler, SamplingCounters, WeightedMass};
use crate::stats::{AlphaHistograms, SufficientStatistics};

/// Owns the corpus and the model state and drives the sweeps.
///
/// Every iteration draws from its own generator derived from `base_seed` and the iteration,
/// so a run restored from a snapshot continues exactly like an uninterrupted one.
pub struct Trainer<O = MinkaFixedPoint> {
    config: TrainingConfig,
    corpus: Corpus,
    stats: SufficientStatistics,
    histograms: AlphaHistograms,
    dispersion: Option<DispersionWeights>,
    held_out: Option<Corpus>,
    scheduler: HyperparameterScheduler,
    optimizer: O,
    iteration: usize,
    base_seed: u64,
    last_counters: SamplingCounters,
}

impl Trainer<MinkaFixedPoint> {
    /// Creates a trainer with the fixed point optimizer from the config.
    /// Documents without topics get a uniformly drawn initial assignment.
    pub fn new(config: TrainingConfig, corpus: Corpus) -> Result<Self, TrainingError> {
        let optimizer = config.minka;
        Self::with_optimizer(config, corpus, optimizer)
    }

    pub fn from_snapshot(snapshot: TrainingSnapshot) -> Result<Self, TrainingError> {
        let optimizer = snapshot.config.minka;
        Self::from_snapshot_with_optimizer(snapshot, optimizer)
    }
}

impl<O: AlphaOptimizer> Trainer<O> {
    pub fn with_optimizer(config: TrainingConfig, mut corpus: Corpus, optimizer: O) -> Result<Self, TrainingError> {
        config.validate()?;
        let base_seed = config.seed.unwrap_or_else(rand::random);
        let num_topics = config.num_topics;
        corpus.assign_missing(num_topics, &mut StdRng::seed_from_u64(base_seed));
        let alpha = SufficientStatistics::symmetric_alpha(num_topics, config.alpha_sum());
        let stats = SufficientStatistics::from_corpus(&corpus, num_topics, alpha, config.beta)?;
        let histograms = AlphaHistograms::new(num_topics, corpus.max_document_length());
        let mut new = Self {
            scheduler: config.scheduler(),
            config,
            corpus,
            stats,
            histograms,
            dispersion: None,
            held_out: None,
            optimizer,
            iteration: 0,
            base_seed,
            last_counters: SamplingCounters::default(),
        };
        new.refresh_dispersion();
        log::info!(
            "Initialised a {} model with {} topics over {} documents, {} tokens and {} types (seed {}).",
            new.config.dispersion.map_or("plain".to_string(), |scheme| format!("{scheme} weighted")),
            num_topics,
            new.corpus.len(),
            new.corpus.total_tokens(),
            new.corpus.vocabulary_size(),
            base_seed
        );
        Ok(new)
    }

    /// Restores a trainer without recomputing anything.
    pub fn from_snapshot_with_optimizer(snapshot: TrainingSnapshot, optimizer: O) -> Result<Self, TrainingError> {
        let TrainingSnapshot { config, corpus, statistics, histograms, dispersion, held_out, iteration, base_seed } = snapshot;
        config.validate()?;
        statistics.ensure_vocabulary_size(corpus.vocabulary_size())?;
        if statistics.num_topics() != config.num_topics {
            return Err(TrainingError::InvalidConfig(format!(
                "The snapshot statistics have {} topics but the config {}!", statistics.num_topics(), config.num_topics
            )))
        }
        if config.dispersion.is_some() != dispersion.is_some() {
            return Err(TrainingError::InvalidConfig("The snapshot dispersion weights do not match the config!".to_string()))
        }
        if let Some(ref weights) = dispersion {
            statistics.ensure_vocabulary_size(weights.len())?;
        }
        corpus.validate_assignments(config.num_topics)?;
        statistics.ensure_matches_corpus(&corpus)?;
        log::info!("Restored a training run at iteration {iteration}.");
        Ok(Self {
            scheduler: config.scheduler(),
            config,
            corpus,
            stats: statistics,
            histograms,
            dispersion,
            held_out,
            optimizer,
            iteration,
            base_seed,
            last_counters: SamplingCounters::default(),
        })
    }

    pub fn snapshot(&self) -> TrainingSnapshot {
        TrainingSnapshot {
            config: self.config.clone(),
            corpus: self.corpus.clone(),
            statistics: self.stats.clone(),
            histograms: self.histograms.clone(),
            dispersion: self.dispersion.clone(),
            held_out: self.held_out.clone(),
            iteration: self.iteration,
            base_seed: self.base_seed,
        }
    }

    /// Sets the corpus used for the held out likelihood in the periodic diagnostics.
    pub fn set_held_out(&mut self, held_out: Corpus) {
        self.held_out = Some(held_out);
    }

    /// Appends documents, the vocabulary size has to match the one the model was built with.
    pub fn add_documents(&mut self, documents: Vec<Document>, vocabulary_size: usize) -> Result<(), TrainingError> {
        self.stats.ensure_vocabulary_size(vocabulary_size)?;
        let num_topics = self.config.num_topics;
        let mut added = Corpus::new(documents, vocabulary_size)?;
        let seed = self.base_seed.rotate_left(32) ^ self.corpus.len() as u64;
        added.assign_missing(num_topics, &mut StdRng::seed_from_u64(seed));
        added.validate_assignments(num_topics)?;
        let offset = self.corpus.len();
        self.corpus.extend(added.into_documents())?;
        self.stats.add_corpus_counts(&self.corpus.documents()[offset..]);
        if let Some(ref weights) = self.dispersion {
            self.stats.rebuild_weight_sums(&self.corpus, weights);
        }
        self.resync();
        log::debug!("Added {} documents, the corpus has now {} documents.", self.corpus.len() - offset, self.corpus.len());
        Ok(())
    }

    fn resync(&mut self) {
        match self.dispersion {
            None => self.stats.resync(&CountMass),
            Some(ref weights) => self.stats.resync(&WeightedMass::new(weights, self.config.balance.as_deref())),
        }
    }

    /// Recomputes the dispersion weights from the current counts, rebuilds the weight sums and resyncs.
    /// Does nothing for a plain model.
    pub fn refresh_dispersion(&mut self) {
        let Some(scheme) = self.config.dispersion else { return };
        let start = Instant::now();
        let weights = DispersionWeights::compute(scheme, &self.stats, &self.corpus);
        self.stats.rebuild_weight_sums(&self.corpus, &weights);
        self.dispersion = Some(weights);
        self.resync();
        log::debug!("Refreshed the {scheme} dispersion weights in {:?}.", start.elapsed());
    }

    /// Re-estimates alpha from the recorded histograms, see [HyperparameterScheduler::reestimate].
    pub fn reestimate_alpha(&mut self) -> Result<bool, TrainingError> {
        let Self { scheduler, optimizer, stats, histograms, dispersion, config, .. } = self;
        match dispersion {
            None => scheduler.reestimate(optimizer, stats, histograms, &CountMass),
            Some(weights) => scheduler.reestimate(
                optimizer,
                stats,
                histograms,
                &WeightedMass::new(weights, config.balance.as_deref())
            ),
        }
    }

    fn sweep_with<R: Rng + ?Sized>(
        stats: &mut SufficientStatistics,
        histograms: Option<&mut AlphaHistograms>,
        corpus: &mut Corpus,
        dispersion: Option<&DispersionWeights>,
        balance: Option<&[f64]>,
        rng: &mut R
    ) -> SamplingCounters {
        let num_topics = stats.num_topics();
        match dispersion {
            None => GibbsSampler::new(CountMass, num_topics)
                .sweep(stats, histograms, corpus.documents_mut(), rng),
            Some(weights) => GibbsSampler::new(WeightedMass::new(weights, balance), num_topics)
                .sweep(stats, histograms, corpus.documents_mut(), rng),
        }
    }

    fn iteration_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(self.iteration as u64 + 1))
    }

    /// Runs exactly one iteration: the scheduled re-estimation and dispersion refresh, then one sweep.
    pub fn step(&mut self) -> Result<SamplingCounters, TrainingError> {
        let iteration = self.iteration;
        let start = Instant::now();

        if self.scheduler.should_optimize(iteration) {
            self.reestimate_alpha()?;
        }
        if self.dispersion.is_some() && iteration > 0 && iteration % self.config.dispersion_interval == 0 {
            self.refresh_dispersion();
        }

        let collect = self.scheduler.should_collect(iteration);
        let mut rng = self.iteration_rng();
        let counters = Self::sweep_with(
            &mut self.stats,
            collect.then_some(&mut self.histograms),
            &mut self.corpus,
            self.dispersion.as_ref(),
            self.config.balance.as_deref(),
            &mut rng
        );
        self.iteration += 1;
        self.last_counters = counters;

        log::debug!(
            "Iteration {iteration} took {:?}: {} term, {} beta and {} smoothing draws, {} fallbacks.",
            start.elapsed(),
            counters.term_draws,
            counters.beta_draws,
            counters.smoothing_draws,
            counters.fallbacks
        );
        if counters.fallbacks > 0 {
            log::warn!("Iteration {iteration} needed {} fallback draws.", counters.fallbacks);
        }

        if self.config.diagnostics_interval != 0 && self.iteration % self.config.diagnostics_interval == 0 {
            self.log_diagnostics(&mut rng)?;
        }
        Ok(counters)
    }

    fn log_diagnostics<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(), TrainingError> {
        let diagnostics = self.diagnostics();
        let log_likelihood = diagnostics.model_log_likelihood();
        let mutual_information = diagnostics.topic_label_mutual_information();
        match self.held_out {
            None => {
                log::info!("<{}> log likelihood: {log_likelihood}, mutual information: {mutual_information}", self.iteration);
            }
            Some(ref held_out) => {
                let empirical = diagnostics.empirical_likelihood(self.config.held_out_samples, held_out, rng)?;
                log::info!(
                    "<{}> log likelihood: {log_likelihood}, held out likelihood: {empirical}, mutual information: {mutual_information}",
                    self.iteration
                );
            }
        }
        Ok(())
    }

    /// Runs until `num_iterations` iterations are completed.
    pub fn run(&mut self) -> Result<usize, TrainingError> {
        let remaining = self.config.num_iterations.saturating_sub(self.iteration);
        self.run_iterations(remaining, None)
    }

    /// Runs up to `iterations` iterations, checking `stop` before each of them.
    /// Returns the number of completed iterations.
    pub fn run_iterations(&mut self, iterations: usize, stop: Option<&AtomicBool>) -> Result<usize, TrainingError> {
        log::info!("Start training for {iterations} iterations at iteration {}.", self.iteration);
        let start = Instant::now();
        let mut completed = 0;
        for _ in 0..iterations {
            if stop.is_some_and(|stop| stop.load(Ordering::Relaxed)) {
                log::info!("Stopped after {completed} iterations.");
                break
            }
            self.step()?;
            completed += 1;
        }
        log::info!("Finished {completed} iterations in {:?}, now at iteration {}.", start.elapsed(), self.iteration);
        Ok(completed)
    }

    pub fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics::new(&self.stats, &self.corpus)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn statistics(&self) -> &SufficientStatistics {
        &self.stats
    }

    pub fn histograms(&self) -> &AlphaHistograms {
        &self.histograms
    }

    pub fn dispersion(&self) -> Option<&DispersionWeights> {
        self.dispersion.as_ref()
    }

    pub fn held_out(&self) -> Option<&Corpus> {
        self.held_out.as_ref()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn last_counters(&self) -> SamplingCounters {
        self.last_counters
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicBool;
    use crate::config::TrainingConfig;
    use crate::corpus::{Corpus, Document};
    use crate::enums::{DispersionScheme, TrainingError};
    use crate::stats::SufficientStatistics;
    use crate::trainer::Trainer;

    fn corpus() -> Corpus {
        Corpus::new(vec![
            Document::new(vec![0, 1, 0, 1, 2]),
            Document::new(vec![3, 4, 3, 4, 3]),
            Document::new(vec![0, 0, 1, 2]),
            Document::new(vec![4, 4, 3]),
        ], 5).unwrap()
    }

    #[test]
    fn the_vocabulary_size_is_fixed(){
        let config = TrainingConfig::builder().num_topics(2).seed(1).build().unwrap();
        let mut trainer = Trainer::new(config, corpus()).unwrap();
        assert!(matches!(
            trainer.add_documents(vec![Document::new(vec![0])], 6),
            Err(TrainingError::VocabularySizeChanged { expected: 5, actual: 6 })
        ));
        assert!(trainer.add_documents(vec![Document::new(vec![7])], 5).is_err());
        assert_eq!(4, trainer.corpus().len());

        trainer.add_documents(vec![Document::new(vec![2, 2, 1])], 5).unwrap();
        assert_eq!(5, trainer.corpus().len());
        assert_eq!(20, trainer.statistics().tokens_per_topic().iter().sum::<u64>());
        trainer.step().unwrap();
    }

    #[test]
    fn stop_flag_is_checked_between_iterations(){
        let config = TrainingConfig::builder().num_topics(2).seed(2).build().unwrap();
        let mut trainer = Trainer::new(config, corpus()).unwrap();
        let stop = AtomicBool::new(true);
        assert_eq!(0, trainer.run_iterations(5, Some(&stop)).unwrap());
        assert_eq!(0, trainer.iteration());
        assert_eq!(3, trainer.run_iterations(3, None).unwrap());
        assert_eq!(3, trainer.iteration());
    }

    #[test]
    fn weighted_training_refreshes_the_weights(){
        let _ = env_logger::builder().is_test(true).try_init();
        let config = TrainingConfig::builder()
            .num_topics(2)
            .num_iterations(12)
            .burn_in(2)
            .save_sample_interval(1)
            .optimize_interval(4)
            .diagnostics_interval(6)
            .held_out_samples(5)
            .dispersion(DispersionScheme::Kurtosis)
            .dispersion_interval(3)
            .seed(3)
            .build()
            .unwrap();
        let mut trainer = Trainer::new(config, corpus()).unwrap();
        trainer.set_held_out(Corpus::new(vec![Document::new(vec![0, 1, 9])], 10).unwrap());
        assert!(trainer.dispersion().is_some());
        assert_eq!(12, trainer.run().unwrap());
        assert_eq!(0, trainer.run().unwrap());
        let stats = trainer.statistics();
        assert!(stats.is_weighted());
        assert!((stats.weight_sum_per_topic().iter().sum::<f64>() - 17.0).abs() < 1e-9);
        assert!(stats.alphas().iter().all(|value| value.is_finite() && *value > 0.0));
    }

    #[test]
    fn held_out_diagnostics_need_samples(){
        let config = TrainingConfig::builder()
            .num_topics(2)
            .diagnostics_interval(1)
            .held_out_samples(0)
            .seed(5)
            .build()
            .unwrap();
        assert!(matches!(Trainer::new(config, corpus()), Err(TrainingError::InvalidConfig(_))));
    }

    #[test]
    fn restoring_checks_the_counts_against_the_assignments(){
        let config = TrainingConfig::builder().num_topics(2).seed(4).build().unwrap();
        let mut trainer = Trainer::new(config, corpus()).unwrap();
        trainer.step().unwrap();
        let mut restored = Trainer::from_snapshot(trainer.snapshot()).unwrap();
        restored.step().unwrap();

        let mut snapshot = trainer.snapshot();
        let other = Corpus::new(vec![Document::new(vec![4]).with_topics(vec![1])], 5).unwrap();
        snapshot.statistics = SufficientStatistics::from_corpus(&other, 2, vec![1.0, 1.0], 0.01).unwrap();
        assert!(matches!(Trainer::from_snapshot(snapshot), Err(TrainingError::InvalidConfig(_))));
    }
}
