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
use wlda_toolkit::sparse_map::SparseTopicMap;
use crate::TopicTo;

/// The histograms consumed by the alpha optimizer.
///
/// `doc_length_counts[n]` counts the documents of length `n` and `topic_doc_counts[t][n]` counts the
/// documents with exactly `n` tokens assigned to topic `t`. Both only see the documents of the
/// statistics collecting sweeps since the last [AlphaHistograms::clear].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaHistograms {
    doc_length_counts: Vec<u32>,
    topic_doc_counts: TopicTo<Vec<u32>>,
    recorded_documents: u64,
}

impl AlphaHistograms {
    pub fn new(num_topics: usize, max_document_length: usize) -> Self {
        Self {
            doc_length_counts: vec![0; max_document_length + 1],
            topic_doc_counts: vec![vec![0; max_document_length + 1]; num_topics],
            recorded_documents: 0
        }
    }

    fn ensure_length(&mut self, length: usize) {
        if length >= self.doc_length_counts.len() {
            self.doc_length_counts.resize(length + 1, 0);
            for histogram in self.topic_doc_counts.iter_mut() {
                histogram.resize(length + 1, 0);
            }
        }
    }

    /// Adds a document of `length` tokens with the topic counts `local_counts`.
    pub fn record_document(&mut self, length: usize, local_counts: &SparseTopicMap<u32>) {
        self.ensure_length(length);
        self.doc_length_counts[length] += 1;
        for &(topic, count) in local_counts {
            self.topic_doc_counts[topic][count as usize] += 1;
        }
        self.recorded_documents += 1;
    }

    /// Resets every bin to zero, the sizes stay the same.
    pub fn clear(&mut self) {
        self.doc_length_counts.fill(0);
        for histogram in self.topic_doc_counts.iter_mut() {
            histogram.fill(0);
        }
        self.recorded_documents = 0;
    }

    pub fn doc_length_counts(&self) -> &[u32] {
        &self.doc_length_counts
    }

    pub fn topic_doc_counts(&self) -> &[Vec<u32>] {
        &self.topic_doc_counts
    }

    pub fn recorded_documents(&self) -> u64 {
        self.recorded_documents
    }

    pub fn is_empty(&self) -> bool {
        self.recorded_documents == 0
    }
}

#[cfg(test)]
mod test {
    use wlda_toolkit::sparse_map::SparseTopicMap;
    use super::AlphaHistograms;

    #[test]
    fn records_grow_and_clear(){
        let mut histograms = AlphaHistograms::new(2, 2);
        let local: SparseTopicMap<u32> = vec![(0, 3), (1, 1)].into_iter().collect();
        histograms.record_document(4, &local);
        assert_eq!(&[0, 0, 0, 0, 1], histograms.doc_length_counts());
        assert_eq!(1, histograms.topic_doc_counts()[0][3]);
        assert_eq!(1, histograms.topic_doc_counts()[1][1]);
        histograms.clear();
        assert!(histograms.is_empty());
        assert_eq!(5, histograms.doc_length_counts().len());
        assert!(histograms.topic_doc_counts().iter().flatten().all(|value| *value == 0));
    }
}
