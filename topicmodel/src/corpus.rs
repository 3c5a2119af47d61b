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

use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::enums::CorpusError;
use crate::{DocumentId, LabelId, TopicId, WordId, WordTo};

/// A document as an ordered sequence of type ids with a parallel sequence of topic assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    tokens: Vec<WordId>,
    topics: Vec<TopicId>,
    source: Option<String>,
    label: Option<LabelId>,
}

impl Document {
    /// Creates a document without topic assignments.
    pub fn new(tokens: Vec<WordId>) -> Self {
        Self {
            tokens,
            topics: Vec::new(),
            source: None,
            label: None
        }
    }

    /// Sets an initial topic assignment, validated when the document becomes part of a [Corpus].
    pub fn with_topics(mut self, topics: Vec<TopicId>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_label(mut self, label: LabelId) -> Self {
        self.label = Some(label);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn tokens(&self) -> &[WordId] {
        &self.tokens
    }

    #[inline]
    pub fn topics(&self) -> &[TopicId] {
        &self.topics
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn label(&self) -> Option<LabelId> {
        self.label
    }

    /// True if there is one topic for every token.
    pub fn is_assigned(&self) -> bool {
        self.tokens.len() == self.topics.len()
    }

    /// The immutable tokens together with the mutable topic assignments.
    pub(crate) fn split_mut(&mut self) -> (&[WordId], &mut [TopicId]) {
        (&self.tokens, &mut self.topics)
    }

    fn assign_uniformly<R: Rng + ?Sized>(&mut self, num_topics: usize, rng: &mut R) {
        self.topics.clear();
        self.topics.extend((0..self.tokens.len()).map(|_| rng.random_range(0..num_topics)));
    }
}

/// An ordered, fixed collection of documents over a vocabulary of known size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    documents: Vec<Document>,
    vocabulary_size: usize,
}

impl Corpus {
    /// Creates a corpus, fails if any type id is not in `0..vocabulary_size`.
    pub fn new(documents: Vec<Document>, vocabulary_size: usize) -> Result<Self, CorpusError> {
        Self::check_types(&documents, vocabulary_size, 0)?;
        Ok(Self { documents, vocabulary_size })
    }

    fn check_types(documents: &[Document], vocabulary_size: usize, offset: DocumentId) -> Result<(), CorpusError> {
        for (document, doc) in documents.iter().enumerate() {
            if let Some((position, &word)) = doc.tokens.iter().enumerate().find(|(_, word)| **word >= vocabulary_size) {
                return Err(CorpusError::TypeOutOfRange {
                    document: document + offset,
                    position,
                    word,
                    vocabulary_size
                })
            }
        }
        Ok(())
    }

    /// Appends documents, fails without changing the corpus if one of them is invalid.
    pub(crate) fn extend(&mut self, documents: Vec<Document>) -> Result<(), CorpusError> {
        Self::check_types(&documents, self.vocabulary_size, self.documents.len())?;
        self.documents.extend(documents);
        Ok(())
    }

    /// Draws a topic uniformly from `0..num_topics` for every token of every document.
    pub fn assign_uniformly<R: Rng + ?Sized>(&mut self, num_topics: usize, rng: &mut R) {
        for doc in self.documents.iter_mut() {
            doc.assign_uniformly(num_topics, rng);
        }
    }

    /// Draws topics only for the documents that do not carry an assignment yet.
    pub fn assign_missing<R: Rng + ?Sized>(&mut self, num_topics: usize, rng: &mut R) {
        for doc in self.documents.iter_mut().filter(|doc| doc.topics.is_empty() && !doc.tokens.is_empty()) {
            doc.assign_uniformly(num_topics, rng);
        }
    }

    /// Checks that every document has exactly one topic in `0..num_topics` per token.
    pub fn validate_assignments(&self, num_topics: usize) -> Result<(), CorpusError> {
        for (document, doc) in self.documents.iter().enumerate() {
            if !doc.is_assigned() {
                return Err(CorpusError::AssignmentLengthMismatch {
                    document,
                    tokens: doc.tokens.len(),
                    topics: doc.topics.len()
                })
            }
            if let Some((position, &topic)) = doc.topics.iter().enumerate().find(|(_, topic)| **topic >= num_topics) {
                return Err(CorpusError::TopicOutOfRange {
                    document,
                    position,
                    topic,
                    num_topics
                })
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, document: DocumentId) -> Option<&Document> {
        self.documents.get(document)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub(crate) fn documents_mut(&mut self) -> &mut [Document] {
        &mut self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    /// The number of tokens in the whole corpus.
    pub fn total_tokens(&self) -> usize {
        self.documents.iter().map(Document::len).sum()
    }

    pub fn max_document_length(&self) -> usize {
        self.documents.iter().map(Document::len).max().unwrap_or(0)
    }

    /// How often every type occurs in the corpus.
    pub fn type_occurrences(&self) -> WordTo<u64> {
        let mut occurrences = vec![0u64; self.vocabulary_size];
        for word in self.documents.iter().flat_map(|doc| doc.tokens.iter()) {
            occurrences[*word] += 1;
        }
        occurrences
    }

    /// In how many documents every type occurs at least once.
    pub fn document_frequencies(&self) -> WordTo<u32> {
        let mut frequencies = vec![0u32; self.vocabulary_size];
        let mut last_seen = vec![usize::MAX; self.vocabulary_size];
        for (document, doc) in self.documents.iter().enumerate() {
            for &word in doc.tokens.iter() {
                if last_seen[word] != document {
                    last_seen[word] = document;
                    frequencies[word] += 1;
                }
            }
        }
        frequencies
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use crate::corpus::{Corpus, Document};
    use crate::enums::CorpusError;

    #[test]
    fn rejects_types_outside_of_the_vocabulary(){
        let result = Corpus::new(vec![Document::new(vec![0, 1]), Document::new(vec![1, 2, 5])], 3);
        assert_eq!(
            CorpusError::TypeOutOfRange { document: 1, position: 2, word: 5, vocabulary_size: 3 },
            result.unwrap_err()
        );
    }

    #[test]
    fn uniform_assignment_covers_every_token(){
        let mut corpus = Corpus::new(vec![Document::new(vec![0, 1, 1]), Document::new(vec![2])], 3).unwrap();
        assert!(corpus.validate_assignments(4).is_err());
        corpus.assign_uniformly(4, &mut StdRng::seed_from_u64(7));
        corpus.validate_assignments(4).unwrap();
        assert!(corpus.iter().flat_map(|doc| doc.topics()).all(|topic| *topic < 4));
    }

    #[test]
    fn rejects_foreign_topics(){
        let corpus = Corpus::new(vec![Document::new(vec![0, 1]).with_topics(vec![0, 3])], 2).unwrap();
        assert_eq!(
            CorpusError::TopicOutOfRange { document: 0, position: 1, topic: 3, num_topics: 2 },
            corpus.validate_assignments(2).unwrap_err()
        );
    }

    #[test]
    fn counts_occurrences_and_document_frequencies(){
        let corpus = Corpus::new(vec![Document::new(vec![0, 0, 1]), Document::new(vec![0, 2])], 4).unwrap();
        assert_eq!(vec![3, 1, 1, 0], corpus.type_occurrences());
        assert_eq!(vec![2, 1, 1, 0], corpus.document_frequencies());
        assert_eq!(5, corpus.total_tokens());
        assert_eq!(3, corpus.max_document_length());
    }
}
