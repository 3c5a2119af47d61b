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

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use wlda_toolkit::normal_number::IsNormalNumber;
use crate::enums::{DispersionScheme, SnapshotError, TrainingError};
use crate::hyper::{HyperparameterScheduler, MinkaFixedPoint};

fn default_beta() -> f64 { 0.01 }
fn default_num_iterations() -> usize { 1000 }
fn default_burn_in() -> usize { 200 }
fn default_save_sample_interval() -> usize { 5 }
fn default_optimize_interval() -> usize { 20 }
fn default_held_out_samples() -> usize { 1000 }
fn default_dispersion_interval() -> usize { 10 }

/// Everything that configures a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(derive(Debug))]
pub struct TrainingConfig {
    pub num_topics: usize,
    /// The initial sum over the symmetric alpha, defaults to the number of topics.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub alpha_sum: Option<f64>,
    #[builder(default = "default_beta()")]
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[builder(default = "default_num_iterations()")]
    #[serde(default = "default_num_iterations")]
    pub num_iterations: usize,
    #[builder(default = "default_burn_in()")]
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// Record the alpha histograms every n iterations after the burn in, 0 disables it.
    #[builder(default = "default_save_sample_interval()")]
    #[serde(default = "default_save_sample_interval")]
    pub save_sample_interval: usize,
    /// Re-estimate alpha every n iterations after the burn in, 0 disables it.
    #[builder(default = "default_optimize_interval()")]
    #[serde(default = "default_optimize_interval")]
    pub optimize_interval: usize,
    /// Log the diagnostics every n iterations, 0 disables it.
    #[builder(default)]
    #[serde(default)]
    pub diagnostics_interval: usize,
    /// Number of prior samples for the held out likelihood.
    #[builder(default = "default_held_out_samples()")]
    #[serde(default = "default_held_out_samples")]
    pub held_out_samples: usize,
    /// Enables the dispersion weighted model.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub dispersion: Option<DispersionScheme>,
    #[builder(default = "default_dispersion_interval()")]
    #[serde(default = "default_dispersion_interval")]
    pub dispersion_interval: usize,
    /// Scales the local weight of every topic in the weighted model.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub balance: Option<Vec<f64>>,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub seed: Option<u64>,
    #[builder(default)]
    #[serde(default)]
    pub minka: MinkaFixedPoint,
}

impl TrainingConfig {
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    pub fn alpha_sum(&self) -> f64 {
        self.alpha_sum.unwrap_or(self.num_topics as f64)
    }

    pub fn is_weighted(&self) -> bool {
        self.dispersion.is_some()
    }

    pub fn scheduler(&self) -> HyperparameterScheduler {
        HyperparameterScheduler::new(self.burn_in, self.save_sample_interval, self.optimize_interval)
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        fn invalid(message: String) -> Result<(), TrainingError> {
            Err(TrainingError::InvalidConfig(message))
        }
        if self.num_topics == 0 {
            return invalid("At least one topic is needed!".to_string())
        }
        if !self.alpha_sum().is_positive_number() {
            return invalid(format!("The alpha sum has to be finite and positive but is {}!", self.alpha_sum()))
        }
        if !self.beta.is_positive_number() {
            return invalid(format!("beta has to be finite and positive but is {}!", self.beta))
        }
        if self.diagnostics_interval != 0 && self.held_out_samples == 0 {
            return invalid("The periodic diagnostics need at least one held out sample!".to_string())
        }
        if self.dispersion.is_some() && self.dispersion_interval == 0 {
            return invalid("The dispersion interval of a weighted model has to be at least 1!".to_string())
        }
        if let Some(ref balance) = self.balance {
            if balance.len() != self.num_topics {
                return invalid(format!("Expected a balance for {} topics but got {}!", self.num_topics, balance.len()))
            }
            if let Some(value) = balance.iter().find(|value| !value.is_finite() || **value < 0.0) {
                return invalid(format!("The balance has to be finite and not negative but contains {value}!"))
            }
        }
        if !self.minka.shape.is_finite() || self.minka.shape < 0.0 || !self.minka.scale.is_positive_number() {
            return invalid(format!("Illegal gamma prior for the alpha optimizer: {:?}", self.minka))
        }
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let writer = BufWriter::new(File::options().write(true).create(true).truncate(true).open(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let reader = BufReader::new(File::options().read(true).open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
