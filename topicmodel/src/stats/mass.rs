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

use crate::sampler::MassFunction;
use crate::stats::SufficientStatistics;
use crate::TopicId;

// Mass tracking: the smoothing only bucket of the sampler and the cached coefficients.
impl SufficientStatistics {
    /// The contribution `alpha[t] * beta / (tokens[t] + betaSum)` of one topic to the smoothing only mass.
    #[inline]
    pub fn smoothing_term(&self, topic: TopicId) -> f64 {
        self.alpha[topic] * self.beta / (self.tokens_per_topic[topic] as f64 + self.beta_sum)
    }

    /// The incrementally maintained smoothing only mass.
    #[inline]
    pub fn smoothing_only_mass(&self) -> f64 {
        self.smoothing_only_mass
    }

    /// The smoothing only mass computed from scratch, O(K).
    pub fn recompute_smoothing_only_mass(&self) -> f64 {
        (0..self.num_topics).map(|topic| self.smoothing_term(topic)).sum()
    }

    #[inline]
    pub fn cached_coefficient(&self, topic: TopicId) -> f64 {
        self.cached_coefficients[topic]
    }

    pub fn cached_coefficients(&self) -> &[f64] {
        &self.cached_coefficients
    }

    #[inline]
    pub(crate) fn set_cached_coefficient(&mut self, topic: TopicId, value: f64) {
        self.cached_coefficients[topic] = value;
    }

    /// The coefficient of `topic` without any document specific mass.
    #[inline]
    pub fn smoothing_coefficient<M: MassFunction + ?Sized>(&self, mass: &M, topic: TopicId) -> f64 {
        self.alpha[topic] / (mass.normalizer(self, topic) + self.beta_sum)
    }

    /// Recomputes the smoothing only mass and every cached coefficient from the current alpha.
    /// Only called between sweeps, never per token.
    pub fn resync<M: MassFunction + ?Sized>(&mut self, mass: &M) {
        let coefficients = (0..self.num_topics)
            .map(|topic| self.smoothing_coefficient(mass, topic))
            .collect::<Vec<_>>();
        self.cached_coefficients = coefficients;
        self.smoothing_only_mass = self.recompute_smoothing_only_mass();
        log::trace!("Resynchronised the masses, smoothing only mass is {}", self.smoothing_only_mass);
    }
}
