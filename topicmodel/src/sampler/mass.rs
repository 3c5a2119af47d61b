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

use crate::dispersion::DispersionWeights;
use crate::sampler::local::LocalTopics;
use crate::stats::SufficientStatistics;
use crate::{TopicId, WordId};

/// Decides which per-topic totals normalize the cached coefficients and how much
/// a document contributes to a topic.
pub trait MassFunction {
    /// The global per-topic total used as normalizer.
    fn normalizer(&self, stats: &SufficientStatistics, topic: TopicId) -> f64;

    /// The mass the current document contributes to `topic`.
    fn local_mass(&self, local: &LocalTopics, topic: TopicId) -> f64;

    /// Writes the per-token weights of a document into `target`, one for each token.
    fn fill_token_weights(&self, tokens: &[WordId], target: &mut Vec<f64>);
}

/// The plain LDA mass: everything is counted.
#[derive(Debug, Copy, Clone, Default)]
pub struct CountMass;

impl MassFunction for CountMass {
    #[inline]
    fn normalizer(&self, stats: &SufficientStatistics, topic: TopicId) -> f64 {
        stats.tokens_in_topic(topic) as f64
    }

    #[inline]
    fn local_mass(&self, local: &LocalTopics, topic: TopicId) -> f64 {
        local.count(topic) as f64
    }

    fn fill_token_weights(&self, tokens: &[WordId], target: &mut Vec<f64>) {
        target.clear();
        target.resize(tokens.len(), 1.0);
    }
}

/// The dispersion weighted mass. Normalizes by the weight sums and uses the
/// local weights, optionally scaled by a per-topic balance factor.
#[derive(Debug, Copy, Clone)]
pub struct WeightedMass<'a> {
    weights: &'a DispersionWeights,
    balance: Option<&'a [f64]>,
}

impl<'a> WeightedMass<'a> {
    pub fn new(weights: &'a DispersionWeights, balance: Option<&'a [f64]>) -> Self {
        Self { weights, balance }
    }

    #[inline]
    fn balance(&self, topic: TopicId) -> f64 {
        match self.balance {
            None => 1.0,
            Some(balance) => balance[topic]
        }
    }
}

impl MassFunction for WeightedMass<'_> {
    #[inline]
    fn normalizer(&self, stats: &SufficientStatistics, topic: TopicId) -> f64 {
        stats.weight_sum_in_topic(topic)
    }

    #[inline]
    fn local_mass(&self, local: &LocalTopics, topic: TopicId) -> f64 {
        local.weight(topic) * self.balance(topic)
    }

    fn fill_token_weights(&self, tokens: &[WordId], target: &mut Vec<f64>) {
        self.weights.fill_token_weights(tokens, target)
    }
}
