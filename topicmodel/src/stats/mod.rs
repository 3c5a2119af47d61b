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

mod mass;
mod histogram;

pub use histogram::AlphaHistograms;

use serde::{Deserialize, Serialize};
use wlda_toolkit::normal_number::IsNormalNumber;
use wlda_toolkit::sparse_map::SparseTopicMap;
use crate::corpus::Corpus;
use crate::dispersion::DispersionWeights;
use crate::enums::TrainingError;
use crate::sampler::CountMass;
use crate::{TopicId, TopicTo, WordId, WordTo};

/// The direction of a single token update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Update {
    Increment,
    Decrement,
}

/// The sparse sufficient statistics of the model together with its hyperparameters
/// and the incrementally tracked smoothing mass.
///
/// Every type keeps a sparse topic map that never stores a zero, `tokens_per_topic`
/// sums to the corpus length and `smoothing_only_mass` is kept consistent with
/// `tokens_per_topic` after every single update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficientStatistics {
    num_topics: usize,
    vocabulary_size: usize,
    type_topic_counts: WordTo<SparseTopicMap<u32>>,
    tokens_per_topic: TopicTo<u64>,
    weight_sum_per_topic: TopicTo<f64>,
    weighted: bool,
    alpha: TopicTo<f64>,
    alpha_sum: f64,
    beta: f64,
    beta_sum: f64,
    smoothing_only_mass: f64,
    cached_coefficients: TopicTo<f64>,
}

impl SufficientStatistics {
    /// A symmetric prior where every topic gets `alpha_sum / num_topics`.
    pub fn symmetric_alpha(num_topics: usize, alpha_sum: f64) -> TopicTo<f64> {
        vec![alpha_sum / num_topics as f64; num_topics]
    }

    /// Creates empty statistics.
    pub fn new(num_topics: usize, vocabulary_size: usize, alpha: TopicTo<f64>, beta: f64) -> Result<Self, TrainingError> {
        if num_topics == 0 {
            return Err(TrainingError::InvalidConfig("At least one topic is needed!".to_string()))
        }
        if !beta.is_positive_number() {
            return Err(TrainingError::InvalidConfig(format!("beta has to be finite and positive but is {beta}!")))
        }
        let alpha_sum = Self::validate_alpha(num_topics, &alpha)?;
        let mut new = Self {
            num_topics,
            vocabulary_size,
            type_topic_counts: vec![SparseTopicMap::new(); vocabulary_size],
            tokens_per_topic: vec![0; num_topics],
            weight_sum_per_topic: vec![0.0; num_topics],
            weighted: false,
            alpha,
            alpha_sum,
            beta,
            beta_sum: beta * vocabulary_size as f64,
            smoothing_only_mass: 0.0,
            cached_coefficients: vec![0.0; num_topics],
        };
        new.resync(&CountMass);
        Ok(new)
    }

    /// Creates the statistics for a corpus where every document already carries its topic assignment.
    pub fn from_corpus(corpus: &Corpus, num_topics: usize, alpha: TopicTo<f64>, beta: f64) -> Result<Self, TrainingError> {
        corpus.validate_assignments(num_topics)?;
        let mut new = Self::new(num_topics, corpus.vocabulary_size(), alpha, beta)?;
        new.add_corpus_counts(corpus.documents());
        Ok(new)
    }

    /// Adds the assignments of `documents` to the counts and resyncs the masses.
    /// The weight sums have to be rebuilt by the caller if the statistics are weighted.
    pub(crate) fn add_corpus_counts<'a>(&mut self, documents: impl IntoIterator<Item=&'a crate::corpus::Document>) {
        for doc in documents {
            for (&word, &topic) in doc.tokens().iter().zip(doc.topics()) {
                self.type_topic_counts[word].increment(topic);
                self.tokens_per_topic[topic] += 1;
            }
        }
        self.resync(&CountMass);
    }

    fn validate_alpha(num_topics: usize, alpha: &[f64]) -> Result<f64, TrainingError> {
        if alpha.len() != num_topics {
            return Err(TrainingError::AlphaLength { expected: num_topics, actual: alpha.len() })
        }
        if let Some((topic, value)) = alpha.iter().enumerate().find(|(_, value)| !value.is_positive_number()) {
            return Err(TrainingError::NonFiniteAlpha { topic, value: *value })
        }
        Ok(alpha.iter().sum())
    }

    /// Applies a single token change for `word` in `topic`.
    ///
    /// Updates the type topic map (dropping entries that reach zero), the topic total,
    /// the weight sum (weighted statistics only) and the smoothing only mass, the latter
    /// by removing the old contribution of `topic`, mutating and adding the new one.
    ///
    /// Panics if a decrement would make a count negative.
    pub fn record_assignment(&mut self, word: WordId, topic: TopicId, update: Update, weight: f64) {
        self.smoothing_only_mass -= self.smoothing_term(topic);
        match update {
            Update::Increment => {
                self.type_topic_counts[word].increment(topic);
                self.tokens_per_topic[topic] += 1;
                if self.weighted {
                    self.weight_sum_per_topic[topic] += weight;
                }
            }
            Update::Decrement => {
                if self.type_topic_counts[word].decrement(topic).is_none() {
                    panic!("The count of type {word} in topic {topic} would become negative!");
                }
                self.tokens_per_topic[topic] -= 1;
                if self.weighted {
                    self.weight_sum_per_topic[topic] -= weight;
                }
            }
        }
        self.smoothing_only_mass += self.smoothing_term(topic);
    }

    /// Recomputes the weight sums per topic from the assignments in `corpus` and switches the
    /// statistics into weighted mode. The cached coefficients have to be resynced afterwards.
    pub fn rebuild_weight_sums(&mut self, corpus: &Corpus, weights: &DispersionWeights) {
        let mut sums = vec![0.0; self.num_topics];
        let mut token_weights = Vec::new();
        for doc in corpus.iter() {
            weights.fill_token_weights(doc.tokens(), &mut token_weights);
            for (&topic, weight) in doc.topics().iter().zip(token_weights.iter()) {
                sums[topic] += weight;
            }
        }
        self.weight_sum_per_topic = sums;
        self.weighted = true;
    }

    /// Installs a new prior. The masses are not touched, call [SufficientStatistics::resync] afterwards.
    pub(crate) fn set_alpha(&mut self, alpha: TopicTo<f64>, alpha_sum: f64) -> Result<(), TrainingError> {
        Self::validate_alpha(self.num_topics, &alpha)?;
        if !alpha_sum.is_positive_number() {
            return Err(TrainingError::NonFiniteAlphaSum(alpha_sum))
        }
        self.alpha = alpha;
        self.alpha_sum = alpha_sum;
        Ok(())
    }

    /// Fails if `vocabulary_size` differs from the size fixed at construction.
    pub fn ensure_vocabulary_size(&self, vocabulary_size: usize) -> Result<(), TrainingError> {
        if vocabulary_size != self.vocabulary_size {
            Err(TrainingError::VocabularySizeChanged { expected: self.vocabulary_size, actual: vocabulary_size })
        } else {
            Ok(())
        }
    }

    /// Fails if the counts disagree with the assignments of `corpus`.
    pub fn ensure_matches_corpus(&self, corpus: &Corpus) -> Result<(), TrainingError> {
        let mismatch = |message: String| -> Result<(), TrainingError> { Err(TrainingError::InvalidConfig(message)) };
        let mut type_topic_counts = vec![SparseTopicMap::<u32>::new(); self.vocabulary_size];
        let mut tokens_per_topic = vec![0u64; self.num_topics];
        for doc in corpus.iter() {
            for (&word, &topic) in doc.tokens().iter().zip(doc.topics()) {
                if word >= self.vocabulary_size || topic >= self.num_topics {
                    return mismatch(format!("The token ({word}, {topic}) is outside of the statistics!"))
                }
                type_topic_counts[word].increment(topic);
                tokens_per_topic[topic] += 1;
            }
        }
        if tokens_per_topic != self.tokens_per_topic {
            return mismatch("The tokens per topic do not match the corpus assignments!".to_string())
        }
        if let Some(word) = (0..self.vocabulary_size).find(|&word| type_topic_counts[word] != self.type_topic_counts[word]) {
            return mismatch(format!("The topic counts of type {word} do not match the corpus assignments!"))
        }
        Ok(())
    }

    #[inline]
    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    #[inline]
    pub fn type_topic_counts(&self, word: WordId) -> &SparseTopicMap<u32> {
        &self.type_topic_counts[word]
    }

    pub fn all_type_topic_counts(&self) -> &[SparseTopicMap<u32>] {
        &self.type_topic_counts
    }

    #[inline]
    pub fn tokens_in_topic(&self, topic: TopicId) -> u64 {
        self.tokens_per_topic[topic]
    }

    pub fn tokens_per_topic(&self) -> &[u64] {
        &self.tokens_per_topic
    }

    #[inline]
    pub fn weight_sum_in_topic(&self, topic: TopicId) -> f64 {
        self.weight_sum_per_topic[topic]
    }

    pub fn weight_sum_per_topic(&self) -> &[f64] {
        &self.weight_sum_per_topic
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    #[inline]
    pub fn alpha(&self, topic: TopicId) -> f64 {
        self.alpha[topic]
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alpha
    }

    pub fn alpha_sum(&self) -> f64 {
        self.alpha_sum
    }

    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    #[inline]
    pub fn beta_sum(&self) -> f64 {
        self.beta_sum
    }

    /// The number of stored (type, topic) entries, all of them are non zero.
    pub fn non_zero_entries(&self) -> usize {
        self.type_topic_counts.iter().map(SparseTopicMap::len).sum()
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use crate::corpus::{Corpus, Document};
    use crate::enums::TrainingError;
    use crate::stats::{SufficientStatistics, Update};

    pub fn scenario_a() -> (Corpus, SufficientStatistics) {
        let corpus = Corpus::new(vec![Document::new(vec![0, 0, 1]).with_topics(vec![0, 0, 1])], 2).unwrap();
        let stats = SufficientStatistics::from_corpus(&corpus, 2, vec![1.0, 1.0], 0.01).unwrap();
        (corpus, stats)
    }

    #[test]
    fn removing_a_token_drops_exactly_one_count(){
        let (_, mut stats) = scenario_a();
        assert_eq!(2, stats.type_topic_counts(0).count(0));
        assert_eq!(2, stats.tokens_in_topic(0));
        stats.record_assignment(0, 0, Update::Decrement, 1.0);
        assert_eq!(&[(0, 1)], stats.type_topic_counts(0).as_slice());
        assert!(!stats.type_topic_counts(0).contains_key(1));
        assert_eq!(1, stats.tokens_in_topic(0));
        assert_eq!(1, stats.tokens_in_topic(1));
    }

    #[test]
    fn entries_disappear_at_zero(){
        let (_, mut stats) = scenario_a();
        stats.record_assignment(1, 1, Update::Decrement, 1.0);
        assert!(stats.type_topic_counts(1).is_empty());
        stats.record_assignment(1, 0, Update::Increment, 1.0);
        assert_eq!(&[(0, 1)], stats.type_topic_counts(1).as_slice());
        assert!(stats.all_type_topic_counts().iter().flat_map(|map| map.iter()).all(|(_, count)| *count > 0));
    }

    #[test]
    fn incremental_smoothing_mass_matches_recompute(){
        let (_, mut stats) = scenario_a();
        let updates = [
            (0, 0, Update::Decrement), (0, 1, Update::Increment),
            (1, 1, Update::Decrement), (1, 0, Update::Increment),
            (0, 1, Update::Decrement), (0, 0, Update::Increment),
        ];
        for (word, topic, update) in updates {
            stats.record_assignment(word, topic, update, 1.0);
            assert_relative_eq!(stats.recompute_smoothing_only_mass(), stats.smoothing_only_mass(), max_relative = 1e-9);
        }
        assert_eq!(3, stats.tokens_per_topic().iter().sum::<u64>());
    }

    #[test]
    #[should_panic]
    fn negative_counts_are_a_programming_error(){
        let (_, mut stats) = scenario_a();
        stats.record_assignment(1, 0, Update::Decrement, 1.0);
    }

    #[test]
    fn cached_coefficients_start_in_smoothing_form(){
        let (_, stats) = scenario_a();
        for topic in 0..2 {
            let expected = 1.0 / (stats.tokens_in_topic(topic) as f64 + stats.beta_sum());
            assert_relative_eq!(expected, stats.cached_coefficient(topic));
        }
        assert_relative_eq!(0.02, stats.beta_sum());
    }

    #[test]
    fn the_vocabulary_size_is_fixed(){
        let (_, stats) = scenario_a();
        stats.ensure_vocabulary_size(2).unwrap();
        assert!(matches!(
            stats.ensure_vocabulary_size(3),
            Err(TrainingError::VocabularySizeChanged { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn detects_counts_that_disagree_with_the_corpus(){
        let (corpus, mut stats) = scenario_a();
        stats.ensure_matches_corpus(&corpus).unwrap();
        stats.record_assignment(1, 1, Update::Decrement, 1.0);
        stats.record_assignment(1, 0, Update::Increment, 1.0);
        assert!(matches!(stats.ensure_matches_corpus(&corpus), Err(TrainingError::InvalidConfig(_))));

        let (_, stats) = scenario_a();
        let other = Corpus::new(vec![Document::new(vec![0, 1, 1]).with_topics(vec![0, 0, 1])], 2).unwrap();
        assert!(stats.ensure_matches_corpus(&other).is_err());
    }

    #[test]
    fn rejects_invalid_priors(){
        assert!(matches!(
            SufficientStatistics::new(2, 3, vec![1.0, f64::NAN], 0.01),
            Err(TrainingError::NonFiniteAlpha { topic: 1, .. })
        ));
        assert!(matches!(
            SufficientStatistics::new(2, 3, vec![1.0], 0.01),
            Err(TrainingError::AlphaLength { expected: 2, actual: 1 })
        ));
        assert!(SufficientStatistics::new(2, 3, vec![1.0, 1.0], 0.0).is_err());
        assert!(SufficientStatistics::new(0, 3, vec![], 0.01).is_err());
    }
}
