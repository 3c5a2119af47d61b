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
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use crate::{DocumentId, TopicId, WordId};

/// The measure used to turn the topic distribution of a type into a dispersion weight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum DispersionScheme {
    /// Squared deviation from the uniform distribution.
    Variance,
    /// Summed deviation of every topic from the most probable one.
    Kurtosis,
    /// Inverse document frequency scaled by the log of the corpus size.
    Idf,
}

/// The errors while building or validating a corpus
#[derive(Debug, Error, PartialEq)]
pub enum CorpusError {
    #[error("Document {document} contains the type {word} at position {position}, but the vocabulary has only {vocabulary_size} types!")]
    TypeOutOfRange {
        document: DocumentId,
        position: usize,
        word: WordId,
        vocabulary_size: usize
    },
    #[error("Document {document} has {tokens} tokens but {topics} topic assignments!")]
    AssignmentLengthMismatch {
        document: DocumentId,
        tokens: usize,
        topics: usize
    },
    #[error("Document {document} assigns the topic {topic} at position {position}, but there are only {num_topics} topics!")]
    TopicOutOfRange {
        document: DocumentId,
        position: usize,
        topic: TopicId,
        num_topics: usize
    },
}

/// The errors while training
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("The alpha optimizer returned {value} for topic {topic}, alpha has to be finite and positive!")]
    NonFiniteAlpha {
        topic: TopicId,
        value: f64
    },
    #[error("The alpha optimizer returned the alpha sum {0}, it has to be finite and positive!")]
    NonFiniteAlphaSum(f64),
    #[error("Expected {expected} alpha values but got {actual}!")]
    AlphaLength {
        expected: usize,
        actual: usize
    },
    #[error("The vocabulary size is fixed to {expected} after initialisation but {actual} was requested!")]
    VocabularySizeChanged {
        expected: usize,
        actual: usize
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// The errors while reading or writing a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("The file does not start with a snapshot header!")]
    MissingHeader,
    #[error("The snapshot has the version {found} but only {supported} is supported!")]
    UnsupportedVersion {
        found: u32,
        supported: u32
    },
}
