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

mod local;
mod mass;

pub use local::LocalTopics;
pub use mass::{CountMass, MassFunction, WeightedMass};

use std::ops::AddAssign;
use rand::Rng;
use crate::corpus::Document;
use crate::stats::{AlphaHistograms, SufficientStatistics, Update};
use crate::{TopicId, WordId};

/// Counts which bucket served each draw.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SamplingCounters {
    pub documents: u64,
    pub tokens: u64,
    pub term_draws: u64,
    pub beta_draws: u64,
    pub smoothing_draws: u64,
    pub fallbacks: u64,
}

impl AddAssign for SamplingCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.documents += rhs.documents;
        self.tokens += rhs.tokens;
        self.term_draws += rhs.term_draws;
        self.beta_draws += rhs.beta_draws;
        self.smoothing_draws += rhs.smoothing_draws;
        self.fallbacks += rhs.fallbacks;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Bucket {
    Term,
    Beta,
    Smoothing
}

/// Resamples the topic assignments of documents with the sparse three bucket
/// decomposition of the collapsed conditional.
///
/// The sampler owns only scratch memory; the statistics are borrowed per document.
/// One instance is meant to live for one sweep.
pub struct GibbsSampler<M> {
    mass: M,
    local: LocalTopics,
    token_weights: Vec<f64>,
    scores: Vec<(TopicId, f64)>,
    counters: SamplingCounters,
}

impl<M: MassFunction> GibbsSampler<M> {
    pub fn new(mass: M, num_topics: usize) -> Self {
        Self {
            mass,
            local: LocalTopics::new(num_topics),
            token_weights: Vec::new(),
            scores: Vec::new(),
            counters: SamplingCounters::default(),
        }
    }

    pub fn mass(&self) -> &M {
        &self.mass
    }

    pub fn counters(&self) -> SamplingCounters {
        self.counters
    }

    #[inline]
    fn coefficient(&self, stats: &SufficientStatistics, topic: TopicId) -> f64 {
        (stats.alpha(topic) + self.mass.local_mass(&self.local, topic))
            / (self.mass.normalizer(stats, topic) + stats.beta_sum())
    }

    #[inline]
    fn topic_beta_term(&self, stats: &SufficientStatistics, topic: TopicId) -> f64 {
        stats.beta() * self.local.count(topic) as f64
            / (stats.tokens_in_topic(topic) as f64 + stats.beta_sum())
    }

    /// Fills the score buffer for `word` and returns the topic term mass.
    pub fn score_type(&mut self, stats: &SufficientStatistics, word: WordId) -> f64 {
        self.scores.clear();
        let mut topic_term_mass = 0.0;
        for &(topic, count) in stats.type_topic_counts(word) {
            let score = stats.cached_coefficient(topic) * count as f64;
            topic_term_mass += score;
            self.scores.push((topic, score));
        }
        topic_term_mass
    }

    fn remove_token(&mut self, stats: &mut SufficientStatistics, word: WordId, topic: TopicId, weight: f64, topic_beta_mass: &mut f64) {
        *topic_beta_mass -= self.topic_beta_term(stats, topic);
        stats.record_assignment(word, topic, Update::Decrement, weight);
        self.local.remove(topic, weight);
        *topic_beta_mass += self.topic_beta_term(stats, topic);
        stats.set_cached_coefficient(topic, self.coefficient(stats, topic));
    }

    fn insert_token(&mut self, stats: &mut SufficientStatistics, word: WordId, topic: TopicId, weight: f64, topic_beta_mass: &mut f64) {
        *topic_beta_mass -= self.topic_beta_term(stats, topic);
        stats.record_assignment(word, topic, Update::Increment, weight);
        self.local.add(topic, weight);
        *topic_beta_mass += self.topic_beta_term(stats, topic);
        stats.set_cached_coefficient(topic, self.coefficient(stats, topic));
    }

    fn draw<R: Rng + ?Sized>(&mut self, stats: &SufficientStatistics, topic_beta_mass: f64, topic_term_mass: f64, rng: &mut R) -> TopicId {
        let total = stats.smoothing_only_mass() + topic_beta_mass + topic_term_mass;
        let mut sample = rng.random::<f64>() * total;

        let (bucket, selected, last) = if sample < topic_term_mass {
            let mut selected = None;
            for &(topic, score) in self.scores.iter() {
                sample -= score;
                if sample <= 0.0 {
                    selected = Some(topic);
                    break
                }
            }
            (Bucket::Term, selected, self.scores.last().map(|(topic, _)| *topic))
        } else {
            sample -= topic_term_mass;
            if sample < topic_beta_mass {
                sample /= stats.beta();
                let mut selected = None;
                for &(topic, count) in self.local.counts() {
                    sample -= count as f64 / (stats.tokens_in_topic(topic) as f64 + stats.beta_sum());
                    if sample <= 0.0 {
                        selected = Some(topic);
                        break
                    }
                }
                (Bucket::Beta, selected, self.local.counts().as_slice().last().map(|(topic, _)| *topic))
            } else {
                sample -= topic_beta_mass;
                sample /= stats.beta();
                let mut selected = None;
                for topic in 0..stats.num_topics() {
                    sample -= stats.alpha(topic) / (stats.tokens_in_topic(topic) as f64 + stats.beta_sum());
                    if sample <= 0.0 {
                        selected = Some(topic);
                        break
                    }
                }
                (Bucket::Smoothing, selected, None)
            }
        };

        match bucket {
            Bucket::Term => self.counters.term_draws += 1,
            Bucket::Beta => self.counters.beta_draws += 1,
            Bucket::Smoothing => self.counters.smoothing_draws += 1,
        }

        match selected {
            Some(topic) => topic,
            None => {
                self.counters.fallbacks += 1;
                match last {
                    Some(topic) => {
                        log::debug!("No topic selected in the {bucket:?} bucket (remaining mass {sample}), falling back to the last candidate {topic}.");
                        topic
                    }
                    None => {
                        let topic = stats.num_topics() - 1;
                        log::warn!("No topic selected in the {bucket:?} bucket (remaining mass {sample}), falling back to topic {topic}.");
                        topic
                    }
                }
            }
        }
    }

    /// Resamples every assignment of `document` in place.
    ///
    /// If `histograms` is given the document is recorded for the alpha re-estimation.
    /// Between two calls the cached coefficients are in the smoothing form.
    pub fn sample_document<R: Rng + ?Sized>(
        &mut self,
        stats: &mut SufficientStatistics,
        histograms: Option<&mut AlphaHistograms>,
        document: &mut Document,
        rng: &mut R
    ) {
        let (tokens, topics) = document.split_mut();
        let mut token_weights = std::mem::take(&mut self.token_weights);
        self.mass.fill_token_weights(tokens, &mut token_weights);

        self.local.clear();
        for (&topic, &weight) in topics.iter().zip(token_weights.iter()) {
            self.local.add(topic, weight);
        }

        let mut topic_beta_mass = 0.0;
        for &(topic, _) in self.local.counts() {
            topic_beta_mass += self.topic_beta_term(stats, topic);
            stats.set_cached_coefficient(topic, self.coefficient(stats, topic));
        }

        for ((&word, assignment), &weight) in tokens.iter().zip(topics.iter_mut()).zip(token_weights.iter()) {
            self.remove_token(stats, word, *assignment, weight, &mut topic_beta_mass);
            let topic_term_mass = self.score_type(stats, word);
            let new_topic = self.draw(stats, topic_beta_mass, topic_term_mass, rng);
            self.insert_token(stats, word, new_topic, weight, &mut topic_beta_mass);
            *assignment = new_topic;
        }

        if let Some(histograms) = histograms {
            histograms.record_document(tokens.len(), self.local.counts());
        }

        for &(topic, _) in self.local.counts() {
            stats.set_cached_coefficient(topic, stats.smoothing_coefficient(&self.mass, topic));
        }

        self.token_weights = token_weights;
        self.counters.documents += 1;
        self.counters.tokens += tokens.len() as u64;
    }

    /// Resamples every document once, in order.
    pub fn sweep<R: Rng + ?Sized>(
        &mut self,
        stats: &mut SufficientStatistics,
        mut histograms: Option<&mut AlphaHistograms>,
        documents: &mut [Document],
        rng: &mut R
    ) -> SamplingCounters {
        let before = self.counters;
        for document in documents.iter_mut() {
            self.sample_document(stats, histograms.as_deref_mut(), document, rng);
        }
        let after = self.counters;
        SamplingCounters {
            documents: after.documents - before.documents,
            tokens: after.tokens - before.tokens,
            term_draws: after.term_draws - before.term_draws,
            beta_draws: after.beta_draws - before.beta_draws,
            smoothing_draws: after.smoothing_draws - before.smoothing_draws,
            fallbacks: after.fallbacks - before.fallbacks,
        }
    }
}
