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

use wlda_toolkit::sparse_map::SparseTopicMap;
use crate::{TopicId, TopicTo};

/// The transient topic counts and weights of the document that is currently resampled.
///
/// The weights are dense, but only the topics present in `counts` are ever non zero.
#[derive(Debug, Clone)]
pub struct LocalTopics {
    counts: SparseTopicMap<u32>,
    weights: TopicTo<f64>,
}

impl LocalTopics {
    pub fn new(num_topics: usize) -> Self {
        Self {
            counts: SparseTopicMap::new(),
            weights: vec![0.0; num_topics],
        }
    }

    pub fn add(&mut self, topic: TopicId, weight: f64) {
        self.counts.increment(topic);
        self.weights[topic] += weight;
    }

    /// Removes one token of `topic`. A topic without tokens left has a weight of exactly zero.
    pub fn remove(&mut self, topic: TopicId, weight: f64) {
        match self.counts.decrement(topic) {
            None => panic!("The document has no token in topic {topic}!"),
            Some(0) => self.weights[topic] = 0.0,
            Some(_) => self.weights[topic] -= weight,
        }
    }

    #[inline]
    pub fn count(&self, topic: TopicId) -> u32 {
        self.counts.count(topic)
    }

    #[inline]
    pub fn weight(&self, topic: TopicId) -> f64 {
        self.weights[topic]
    }

    pub fn counts(&self) -> &SparseTopicMap<u32> {
        &self.counts
    }

    pub fn clear(&mut self) {
        for &(topic, _) in self.counts.iter() {
            self.weights[topic] = 0.0;
        }
        self.counts.clear();
    }
}

#[cfg(test)]
mod test {
    use super::LocalTopics;

    #[test]
    fn empty_topics_have_zero_weight(){
        let mut local = LocalTopics::new(3);
        local.add(2, 0.3);
        local.add(2, 0.1);
        local.remove(2, 0.3);
        local.remove(2, 0.1);
        assert_eq!(0.0, local.weight(2));
        assert!(local.counts().is_empty());
        local.add(0, 1.0);
        local.clear();
        assert_eq!(0.0, local.weight(0));
        assert_eq!(0, local.count(0));
    }
}
