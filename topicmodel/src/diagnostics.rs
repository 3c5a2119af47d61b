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

use std::cmp::Reverse;
use std::collections::HashMap;
use itertools::Itertools;
use rand::Rng;
use statrs::function::gamma::ln_gamma;
use wlda_toolkit::log_math::{entropy_bits, log_sum_exp};
use crate::corpus::{Corpus, Document};
use crate::dispersion::DispersionWeights;
use crate::enums::TrainingError;
use crate::math::{ln_gamma_ratio, sample_dirichlet};
use crate::stats::SufficientStatistics;
use crate::{LabelId, TopicId, WordId};

/// Read only quality measures over the current state of a model.
#[derive(Debug, Copy, Clone)]
pub struct Diagnostics<'a> {
    stats: &'a SufficientStatistics,
    corpus: &'a Corpus,
}

impl<'a> Diagnostics<'a> {
    pub fn new(stats: &'a SufficientStatistics, corpus: &'a Corpus) -> Self {
        Self { stats, corpus }
    }

    /// The joint log probability of the assignments and the words, with theta and phi integrated out.
    pub fn model_log_likelihood(&self) -> f64 {
        let stats = self.stats;
        let num_topics = stats.num_topics();
        let mut log_likelihood = 0.0;

        let mut topic_counts = vec![0u64; num_topics];
        for doc in self.corpus.iter() {
            for &topic in doc.topics() {
                topic_counts[topic] += 1;
            }
            for (topic, &count) in topic_counts.iter().enumerate() {
                if count > 0 {
                    log_likelihood += ln_gamma_ratio(stats.alpha(topic), count as f64);
                }
            }
            log_likelihood -= ln_gamma(stats.alpha_sum() + doc.len() as f64);
            topic_counts.fill(0);
        }
        log_likelihood += self.corpus.len() as f64 * ln_gamma(stats.alpha_sum());

        let beta = stats.beta();
        let beta_sum = stats.beta_sum();
        let mut non_zero = 0usize;
        for counts in stats.all_type_topic_counts() {
            for &(_, count) in counts {
                non_zero += 1;
                log_likelihood += ln_gamma(beta + count as f64);
            }
        }
        for &tokens in stats.tokens_per_topic() {
            log_likelihood -= ln_gamma(beta_sum + tokens as f64);
        }
        log_likelihood += num_topics as f64 * ln_gamma(beta_sum) - non_zero as f64 * ln_gamma(beta);
        log_likelihood
    }

    /// Estimates the log likelihood of `held_out` by averaging over `num_samples` document
    /// topic distributions drawn from the prior. Types unknown to the model are ignored.
    pub fn empirical_likelihood<R: Rng + ?Sized>(&self, num_samples: usize, held_out: &Corpus, rng: &mut R) -> Result<f64, TrainingError> {
        if num_samples == 0 {
            return Err(TrainingError::InvalidConfig("The empirical likelihood needs at least one sample!".to_string()))
        }
        let stats = self.stats;
        let vocabulary_size = stats.vocabulary_size();
        let mut likelihoods = vec![Vec::with_capacity(num_samples); held_out.len()];
        let mut multinomial = vec![0.0; vocabulary_size];

        for _ in 0..num_samples {
            let theta = sample_dirichlet(stats.alphas(), rng)?;
            for (word, value) in multinomial.iter_mut().enumerate() {
                let counts = stats.type_topic_counts(word);
                *value = theta.iter().enumerate().map(|(topic, p)| {
                    p * (stats.beta() + counts.count(topic) as f64)
                        / (stats.beta_sum() + stats.tokens_in_topic(topic) as f64)
                }).sum::<f64>().ln();
            }
            for (doc, target) in held_out.iter().zip(likelihoods.iter_mut()) {
                let value: f64 = doc.tokens().iter()
                    .filter(|word| **word < vocabulary_size)
                    .map(|&word| multinomial[word])
                    .sum();
                target.push(value);
            }
        }

        let log_samples = (num_samples as f64).ln();
        Ok(likelihoods.iter().map(|values| log_sum_exp(values) - log_samples).sum())
    }

    /// The mutual information in bits between the topic of a token and the label of its document.
    /// Documents without a label are skipped, without any label the result is 0.
    pub fn topic_label_mutual_information(&self) -> f64 {
        let mut joint: HashMap<(TopicId, LabelId), u64> = HashMap::new();
        let mut topics: HashMap<TopicId, u64> = HashMap::new();
        let mut labels: HashMap<LabelId, u64> = HashMap::new();
        let mut total = 0u64;
        for doc in self.corpus.iter() {
            let Some(label) = doc.label() else { continue };
            for &topic in doc.topics() {
                *joint.entry((topic, label)).or_default() += 1;
                *topics.entry(topic).or_default() += 1;
                total += 1;
            }
            *labels.entry(label).or_default() += doc.len() as u64;
        }
        if total == 0 {
            return 0.0
        }
        entropy_bits(topics.into_values(), total)
            + entropy_bits(labels.into_values(), total)
            - entropy_bits(joint.into_values(), total)
    }

    /// The topic proportions of `document`, descending, cut at `threshold` and at `max` entries.
    pub fn document_topics(&self, document: &Document, threshold: f64, max: Option<usize>) -> Vec<(TopicId, f64)> {
        if document.is_empty() {
            return Vec::new()
        }
        let len = document.len() as f64;
        document.topics().iter().counts().into_iter()
            .map(|(topic, count)| (*topic, count as f64 / len))
            .sorted_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)))
            .take_while(|(_, proportion)| *proportion >= threshold)
            .take(max.unwrap_or(usize::MAX))
            .collect_vec()
    }

    /// The `n` types with the highest count in `topic`, optionally scaled by their dispersion weight.
    pub fn top_types(&self, topic: TopicId, n: usize, weights: Option<&DispersionWeights>) -> Vec<(WordId, f64)> {
        self.stats.all_type_topic_counts().iter().enumerate()
            .filter_map(|(word, counts)| {
                let count = counts.get(topic)? as f64;
                Some((word, weights.map_or(count, |weights| count * weights.weight(word))))
            })
            .sorted_by_key(|(word, score)| (Reverse(score.to_bits()), *word))
            .take(n)
            .collect_vec()
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use crate::corpus::{Corpus, Document};
    use crate::diagnostics::Diagnostics;
    use crate::dispersion::DispersionWeights;
    use crate::enums::DispersionScheme;
    use crate::stats::SufficientStatistics;

    fn single_topic() -> (Corpus, SufficientStatistics) {
        let corpus = Corpus::new(vec![Document::new(vec![0, 0, 1]).with_topics(vec![0, 0, 0])], 2).unwrap();
        let stats = SufficientStatistics::from_corpus(&corpus, 1, vec![1.0], 0.5).unwrap();
        (corpus, stats)
    }

    #[test]
    fn log_likelihood_of_a_single_topic(){
        let (corpus, stats) = single_topic();
        // (0.5 / 1) * (1.5 / 2) * (0.5 / 3)
        assert_relative_eq!(-(16f64.ln()), Diagnostics::new(&stats, &corpus).model_log_likelihood(), epsilon = 1e-9);
    }

    #[test]
    fn log_likelihood_prefers_coherent_assignments(){
        let docs = |topics: [Vec<usize>; 2]| {
            let [a, b] = topics;
            Corpus::new(vec![
                Document::new(vec![0, 0, 0, 0]).with_topics(a),
                Document::new(vec![1, 1, 1, 1]).with_topics(b),
            ], 2).unwrap()
        };
        let coherent = docs([vec![0; 4], vec![1; 4]]);
        let mixed = docs([vec![0, 1, 0, 1], vec![1, 0, 1, 0]]);
        let ll = |corpus: &Corpus| {
            let stats = SufficientStatistics::from_corpus(corpus, 2, vec![0.1, 0.1], 0.01).unwrap();
            Diagnostics::new(&stats, corpus).model_log_likelihood()
        };
        assert!(ll(&coherent) > ll(&mixed));
    }

    #[test]
    fn empirical_likelihood_with_one_topic(){
        let (corpus, stats) = single_topic();
        let held_out = Corpus::new(vec![Document::new(vec![0, 5]), Document::new(vec![])], 6).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let value = Diagnostics::new(&stats, &corpus).empirical_likelihood(10, &held_out, &mut rng).unwrap();
        assert_relative_eq!((2.5f64 / 4.0).ln(), value, epsilon = 1e-9);
        assert!(Diagnostics::new(&stats, &corpus).empirical_likelihood(0, &held_out, &mut rng).is_err());
    }

    #[test]
    fn mutual_information_in_bits(){
        let corpus = Corpus::new(vec![
            Document::new(vec![0, 1]).with_topics(vec![0, 0]).with_label(0),
            Document::new(vec![1, 0]).with_topics(vec![1, 1]).with_label(1),
            Document::new(vec![1, 1]).with_topics(vec![0, 1]),
        ], 2).unwrap();
        let stats = SufficientStatistics::from_corpus(&corpus, 2, vec![1.0, 1.0], 0.01).unwrap();
        assert_relative_eq!(1.0, Diagnostics::new(&stats, &corpus).topic_label_mutual_information(), epsilon = 1e-12);

        let unlabelled = Corpus::new(vec![Document::new(vec![0]).with_topics(vec![1])], 2).unwrap();
        let stats = SufficientStatistics::from_corpus(&unlabelled, 2, vec![1.0, 1.0], 0.01).unwrap();
        assert_eq!(0.0, Diagnostics::new(&stats, &unlabelled).topic_label_mutual_information());
    }

    #[test]
    fn reports(){
        let corpus = Corpus::new(vec![
            Document::new(vec![0, 1, 1, 2]).with_topics(vec![0, 1, 1, 1]),
        ], 3).unwrap();
        let stats = SufficientStatistics::from_corpus(&corpus, 2, vec![1.0, 1.0], 0.01).unwrap();
        let diagnostics = Diagnostics::new(&stats, &corpus);
        let doc = corpus.get(0).unwrap();
        assert_eq!(vec![(1, 0.75), (0, 0.25)], diagnostics.document_topics(doc, 0.0, None));
        assert_eq!(vec![(1, 0.75)], diagnostics.document_topics(doc, 0.5, None));
        assert_eq!(vec![(1, 0.75)], diagnostics.document_topics(doc, 0.0, Some(1)));

        assert_eq!(vec![(1, 2.0), (2, 1.0)], diagnostics.top_types(1, 5, None));
        let weights = DispersionWeights::from_weights(DispersionScheme::Variance, vec![1.0, 0.25, 1.0]);
        assert_eq!(vec![(2, 1.0), (1, 0.5)], diagnostics.top_types(1, 2, Some(&weights)));
    }
}
