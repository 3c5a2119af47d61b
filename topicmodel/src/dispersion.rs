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

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use wlda_toolkit::sparse_map::SparseTopicMap;
use crate::corpus::Corpus;
use crate::enums::DispersionScheme;
use crate::stats::SufficientStatistics;
use crate::{WordId, WordTo};

/// A weight in `[0, 1]` for every type, describing how peaked its topic distribution is.
/// 0 means uniform, 1 means the type belongs to a single topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionWeights {
    scheme: DispersionScheme,
    weights: WordTo<f64>,
}

impl DispersionWeights {
    pub fn from_weights(scheme: DispersionScheme, weights: WordTo<f64>) -> Self {
        Self { scheme, weights }
    }

    /// Computes the weights of every type from the current statistics.
    pub fn compute(scheme: DispersionScheme, stats: &SufficientStatistics, corpus: &Corpus) -> Self {
        let weights = match scheme {
            DispersionScheme::Variance => {
                stats.all_type_topic_counts().par_iter().map(|counts| {
                    Self::variance(counts, stats.tokens_per_topic())
                }).collect()
            }
            DispersionScheme::Kurtosis => {
                stats.all_type_topic_counts().par_iter().map(|counts| {
                    Self::kurtosis(counts, stats.tokens_per_topic())
                }).collect()
            }
            DispersionScheme::Idf => {
                let documents = corpus.len();
                corpus.document_frequencies().into_par_iter().map(|df| {
                    Self::idf(df as usize, documents)
                }).collect()
            }
        };
        Self { scheme, weights }
    }

    /// Divides every count by the total of its topic and renormalizes the result.
    /// Returns `None` for a type without any mass.
    fn topic_distribution(counts: &SparseTopicMap<u32>, tokens_per_topic: &[u64]) -> Option<Vec<f64>> {
        let mut distribution = vec![0.0; tokens_per_topic.len()];
        let mut sum = 0.0;
        for &(topic, count) in counts {
            let total = tokens_per_topic[topic];
            if total > 0 {
                let value = count as f64 / total as f64;
                distribution[topic] = value;
                sum += value;
            }
        }
        if sum <= 0.0 {
            return None
        }
        distribution.iter_mut().for_each(|value| *value /= sum);
        Some(distribution)
    }

    /// The squared deviation from the uniform distribution, scaled into `[0, 1]`.
    pub fn variance(counts: &SparseTopicMap<u32>, tokens_per_topic: &[u64]) -> f64 {
        let num_topics = tokens_per_topic.len();
        if num_topics < 2 {
            return 0.0
        }
        let Some(distribution) = Self::topic_distribution(counts, tokens_per_topic) else {
            return 0.0
        };
        let uniform = 1.0 / num_topics as f64;
        let variance: f64 = distribution.iter().map(|p| {
            let x = p - uniform;
            x * x
        }).sum();
        variance / (1.0 - uniform)
    }

    /// The summed distance to the most probable topic, scaled into `[0, 1]`.
    pub fn kurtosis(counts: &SparseTopicMap<u32>, tokens_per_topic: &[u64]) -> f64 {
        let num_topics = tokens_per_topic.len();
        if num_topics < 2 {
            return 0.0
        }
        let Some(distribution) = Self::topic_distribution(counts, tokens_per_topic) else {
            return 0.0
        };
        let max = distribution.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let deviation: f64 = distribution.iter().map(|p| max - p).sum();
        deviation / (num_topics - 1) as f64
    }

    /// `ln(N / df) / ln(N)`, zero for types in no or in every document.
    pub fn idf(document_frequency: usize, documents: usize) -> f64 {
        if document_frequency == 0 || document_frequency >= documents {
            0.0
        } else {
            (documents as f64 / document_frequency as f64).ln() / (documents as f64).ln()
        }
    }

    pub fn scheme(&self) -> DispersionScheme {
        self.scheme
    }

    #[inline]
    pub fn weight(&self, word: WordId) -> f64 {
        self.weights[word]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Writes the weight of every token into `target`, rescaled so that they sum up to the
    /// number of tokens. If all weights are zero every token gets a weight of 1.
    pub fn fill_token_weights(&self, tokens: &[WordId], target: &mut Vec<f64>) {
        target.clear();
        target.extend(tokens.iter().map(|&word| self.weights[word]));
        let sum: f64 = target.iter().sum();
        if sum > 0.0 {
            let scale = tokens.len() as f64 / sum;
            target.iter_mut().for_each(|value| *value *= scale);
        } else {
            target.fill(1.0);
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use wlda_toolkit::sparse_map::SparseTopicMap;
    use crate::corpus::{Corpus, Document};
    use crate::dispersion::DispersionWeights;
    use crate::enums::DispersionScheme;
    use crate::stats::SufficientStatistics;

    fn counts(entries: &[(usize, u32)]) -> SparseTopicMap<u32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn identical_counts_are_not_dispersed(){
        let totals = [10, 10, 10];
        let map = counts(&[(0, 2), (1, 2), (2, 2)]);
        assert_relative_eq!(0.0, DispersionWeights::variance(&map, &totals), epsilon = 1e-12);
        assert_relative_eq!(0.0, DispersionWeights::kurtosis(&map, &totals), epsilon = 1e-12);
    }

    #[test]
    fn a_single_topic_is_fully_dispersed(){
        let totals = [10, 4, 7];
        let map = counts(&[(1, 3)]);
        assert_relative_eq!(1.0, DispersionWeights::variance(&map, &totals), epsilon = 1e-12);
        assert_relative_eq!(1.0, DispersionWeights::kurtosis(&map, &totals), epsilon = 1e-12);
    }

    #[test]
    fn counts_are_normalized_by_topic_totals(){
        // 2/4 and 4/8 are the same share of their topics
        let map = counts(&[(0, 2), (1, 4)]);
        assert_relative_eq!(0.0, DispersionWeights::variance(&map, &[4, 8]), epsilon = 1e-12);
        let skewed = DispersionWeights::variance(&counts(&[(0, 3), (1, 1)]), &[4, 4]);
        assert!(skewed > 0.0 && skewed < 1.0);
    }

    #[test]
    fn degenerate_rows_weigh_nothing(){
        let empty = SparseTopicMap::new();
        assert_eq!(0.0, DispersionWeights::variance(&empty, &[3, 3]));
        assert_eq!(0.0, DispersionWeights::kurtosis(&empty, &[3, 3]));
        let map = counts(&[(0, 3)]);
        assert_eq!(0.0, DispersionWeights::variance(&map, &[3]));
        assert_eq!(0.0, DispersionWeights::kurtosis(&map, &[3]));
    }

    #[test]
    fn idf_bounds(){
        assert_eq!(0.0, DispersionWeights::idf(0, 10));
        assert_eq!(0.0, DispersionWeights::idf(10, 10));
        assert_relative_eq!(1.0, DispersionWeights::idf(1, 10));
        assert_relative_eq!(0.5, DispersionWeights::idf(10, 100), epsilon = 1e-12);
    }

    #[test]
    fn compute_over_a_corpus(){
        let corpus = Corpus::new(vec![
            Document::new(vec![0, 1, 2]).with_topics(vec![0, 0, 1]),
            Document::new(vec![1, 2]).with_topics(vec![1, 0]),
        ], 4).unwrap();
        let stats = SufficientStatistics::from_corpus(&corpus, 2, vec![0.5, 0.5], 0.01).unwrap();

        let variance = DispersionWeights::compute(DispersionScheme::Variance, &stats, &corpus);
        assert_eq!(4, variance.len());
        assert_relative_eq!(1.0, variance.weight(0), epsilon = 1e-12);
        assert_eq!(0.0, variance.weight(3));
        assert!(variance.as_slice().iter().all(|w| (0.0..=1.0).contains(w)));

        let idf = DispersionWeights::compute(DispersionScheme::Idf, &stats, &corpus);
        assert_relative_eq!(1.0, idf.weight(0));
        assert_eq!(0.0, idf.weight(1));
        assert_eq!(0.0, idf.weight(3));
        assert_eq!(DispersionScheme::Idf, idf.scheme());
    }

    #[test]
    fn token_weights_sum_to_the_length(){
        let weights = DispersionWeights::from_weights(DispersionScheme::Variance, vec![0.5, 0.25, 0.0]);
        let mut target = Vec::new();
        weights.fill_token_weights(&[0, 1, 1, 2], &mut target);
        assert_relative_eq!(4.0, target.iter().sum::<f64>(), epsilon = 1e-12);
        assert_relative_eq!(2.0, target[0]);
        assert_eq!(0.0, target[3]);
        weights.fill_token_weights(&[2, 2], &mut target);
        assert_eq!(vec![1.0, 1.0], target);
    }
}
