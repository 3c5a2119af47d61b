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

use itertools::Itertools;
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::ln_gamma;
use crate::enums::TrainingError;

/// `ln Γ(a + n) - ln Γ(a)`
#[inline]
pub(crate) fn ln_gamma_ratio(a: f64, n: f64) -> f64 {
    ln_gamma(a + n) - ln_gamma(a)
}

/// Draws a sample from `Dirichlet(alpha)` by normalizing independent `Gamma(alpha_k, 1)` draws.
pub(crate) fn sample_dirichlet<R: Rng + ?Sized>(alpha: &[f64], rng: &mut R) -> Result<Vec<f64>, TrainingError> {
    let mut draws: Vec<f64> = alpha.iter().enumerate().map(|(topic, &value)| {
        Gamma::new(value, 1.0)
            .map(|gamma| gamma.sample(rng))
            .map_err(|_| TrainingError::NonFiniteAlpha { topic, value })
    }).collect::<Result<_, _>>()?;
    let sum: f64 = draws.iter().sum();
    if sum > 0.0 {
        draws.iter_mut().for_each(|value| *value /= sum);
    } else {
        // every draw underflowed, fall back to the expectation
        let alpha_sum: f64 = alpha.iter().sum();
        draws = alpha.iter().map(|value| value / alpha_sum).collect_vec();
    }
    Ok(draws)
}
