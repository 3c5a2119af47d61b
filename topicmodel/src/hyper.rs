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

use serde::{Deserialize, Serialize};
use crate::enums::TrainingError;
use crate::sampler::MassFunction;
use crate::stats::{AlphaHistograms, SufficientStatistics};
use crate::TopicTo;

/// Estimates a new asymmetric alpha from the recorded histograms.
///
/// Returns the new alpha together with its sum.
pub trait AlphaOptimizer {
    fn optimize(
        &mut self,
        alpha: &[f64],
        topic_doc_counts: &[Vec<u32>],
        doc_length_counts: &[u32]
    ) -> Result<(TopicTo<f64>, f64), TrainingError>;
}

impl<F> AlphaOptimizer for F
where
    F: FnMut(&[f64], &[Vec<u32>], &[u32]) -> Result<(TopicTo<f64>, f64), TrainingError>
{
    #[inline]
    fn optimize(&mut self, alpha: &[f64], topic_doc_counts: &[Vec<u32>], doc_length_counts: &[u32]) -> Result<(TopicTo<f64>, f64), TrainingError> {
        self(alpha, topic_doc_counts, doc_length_counts)
    }
}

/// Minka's fixed point iteration for the parameters of a Dirichlet-multinomial,
/// using the digamma recurrence over count histograms and a gamma prior.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinkaFixedPoint {
    pub shape: f64,
    pub scale: f64,
    pub iterations: usize,
}

impl Default for MinkaFixedPoint {
    fn default() -> Self {
        Self {
            shape: 1.00001,
            scale: 1.0,
            iterations: 200,
        }
    }
}

impl AlphaOptimizer for MinkaFixedPoint {
    fn optimize(&mut self, alpha: &[f64], topic_doc_counts: &[Vec<u32>], doc_length_counts: &[u32]) -> Result<(TopicTo<f64>, f64), TrainingError> {
        let mut parameters = alpha.to_vec();
        let mut parameters_sum: f64 = parameters.iter().sum();

        let non_zero_limits = topic_doc_counts.iter().map(|histogram| {
            histogram.iter().rposition(|value| *value > 0).unwrap_or(0)
        }).collect::<Vec<_>>();

        for _ in 0..self.iterations {
            let mut denominator = 0.0;
            let mut current_digamma = 0.0;
            for (i, &count) in doc_length_counts.iter().enumerate().skip(1) {
                current_digamma += 1.0 / (parameters_sum + i as f64 - 1.0);
                denominator += count as f64 * current_digamma;
            }
            denominator -= 1.0 / self.scale;
            if denominator <= 0.0 {
                // the histograms do not bound the prior any more, keep the last positive estimate
                log::debug!("Stopped the fixed point iteration with the denominator {denominator}.");
                break
            }

            parameters_sum = 0.0;
            for ((parameter, histogram), &limit) in parameters.iter_mut().zip(topic_doc_counts).zip(&non_zero_limits) {
                let old = *parameter;
                let mut numerator = 0.0;
                let mut current_digamma = 0.0;
                for (i, &count) in histogram.iter().enumerate().take(limit + 1).skip(1) {
                    current_digamma += 1.0 / (old + i as f64 - 1.0);
                    numerator += count as f64 * current_digamma;
                }
                *parameter = old * (numerator + self.shape) / denominator;
                parameters_sum += *parameter;
            }
        }

        Ok((parameters, parameters_sum))
    }
}

/// Decides when statistics are collected and when alpha is re-estimated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperparameterScheduler {
    burn_in: usize,
    save_sample_interval: usize,
    optimize_interval: usize,
}

impl HyperparameterScheduler {
    pub fn new(burn_in: usize, save_sample_interval: usize, optimize_interval: usize) -> Self {
        Self { burn_in, save_sample_interval, optimize_interval }
    }

    /// Whether the sweep of `iteration` records the alpha histograms.
    pub fn should_collect(&self, iteration: usize) -> bool {
        iteration >= self.burn_in
            && self.save_sample_interval != 0
            && iteration % self.save_sample_interval == 0
    }

    /// Whether alpha is re-estimated before the sweep of `iteration`.
    pub fn should_optimize(&self, iteration: usize) -> bool {
        self.optimize_interval != 0
            && iteration > self.burn_in
            && iteration % self.optimize_interval == 0
    }

    /// Runs `optimizer` on the histograms and installs the result.
    ///
    /// The new alpha is validated before anything is changed. On success the histograms are
    /// cleared and the masses are resynced. Returns `false` if there was nothing recorded yet.
    pub fn reestimate<O: AlphaOptimizer + ?Sized, M: MassFunction + ?Sized>(
        &self,
        optimizer: &mut O,
        stats: &mut SufficientStatistics,
        histograms: &mut AlphaHistograms,
        mass: &M
    ) -> Result<bool, TrainingError> {
        if histograms.is_empty() {
            log::debug!("No documents recorded since the last re-estimation, alpha stays unchanged.");
            return Ok(false)
        }
        let (alpha, alpha_sum) = optimizer.optimize(
            stats.alphas(),
            histograms.topic_doc_counts(),
            histograms.doc_length_counts()
        )?;
        stats.set_alpha(alpha, alpha_sum)?;
        log::debug!("Re-estimated alpha from {} documents, alpha sum is now {alpha_sum}", histograms.recorded_documents());
        histograms.clear();
        stats.resync(mass);
        Ok(true)
    }
}
