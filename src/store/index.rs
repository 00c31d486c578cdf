use serde::{Deserialize, Serialize};

use super::embedder::Embedding;
use crate::error::AssistantError;

/// One embedded chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document_id: String,
    pub chunk: String,
    pub embedding: Embedding,
}

/// Search result with chunk and relevance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub chunk: String,
    /// Cosine similarity (higher is better)
    pub score: f32,
    /// Rank in the result list (1-indexed)
    pub rank: usize,
}

/// Flat cosine-similarity index over document chunks.
///
/// Derived state: always reconstructible from the document set. Entries are
/// upserted per document so additions never require a full rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    model_name: String,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            dimension: None,
            entries: Vec::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embedding width, fixed by the first upserted chunk
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every chunk of `document_id` with the given chunks
    pub fn upsert(
        &mut self,
        document_id: &str,
        chunks: Vec<(String, Embedding)>,
    ) -> Result<(), AssistantError> {
        for (_, embedding) in &chunks {
            match self.dimension {
                Some(dimension) if dimension != embedding.len() => {
                    return Err(AssistantError::Embedding(format!(
                        "embedding has {} dimensions, index expects {}",
                        embedding.len(),
                        dimension
                    )));
                }
                Some(_) => {}
                None => self.dimension = Some(embedding.len()),
            }
        }

        self.entries.retain(|entry| entry.document_id != document_id);
        self.entries
            .extend(chunks.into_iter().map(|(chunk, embedding)| IndexEntry {
                document_id: document_id.to_string(),
                chunk,
                embedding,
            }));

        Ok(())
    }

    /// Whether every id has at least one entry and no entry is orphaned
    pub fn covers<'a, I>(&self, document_ids: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: std::collections::HashSet<&str> = document_ids.into_iter().collect();
        let indexed: std::collections::HashSet<&str> = self
            .entries
            .iter()
            .map(|entry| entry.document_id.as_str())
            .collect();

        ids == indexed
    }

    /// Top-k chunks by cosine similarity to `query`
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(index, (score, entry))| SearchHit {
                document_id: entry.document_id.clone(),
                chunk: entry.chunk.clone(),
                score,
                rank: index + 1,
            })
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(&str, &str, [f32; 2])]) -> VectorIndex {
        let mut index = VectorIndex::new("test");
        for (id, chunk, embedding) in entries {
            index
                .upsert(id, vec![(chunk.to_string(), embedding.to_vec())])
                .unwrap();
        }
        index
    }

    #[test]
    fn search_ranks_by_similarity() {
        let index = index_with(&[
            ("a", "soup", [1.0, 0.0]),
            ("b", "salad", [0.0, 1.0]),
            ("c", "stew", [0.8, 0.2]),
        ]);

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "a");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].document_id, "c");
        assert_eq!(hits[1].rank, 2);
    }

    #[test]
    fn search_returns_fewer_hits_than_k_for_small_index() {
        let index = index_with(&[("a", "soup", [1.0, 0.0])]);
        assert_eq!(index.search(&[0.5, 0.5], 3).len(), 1);
    }

    #[test]
    fn upsert_replaces_document_chunks() {
        let mut index = index_with(&[("a", "old", [1.0, 0.0])]);
        index
            .upsert(
                "a",
                vec![
                    ("new one".to_string(), vec![0.0, 1.0]),
                    ("new two".to_string(), vec![1.0, 1.0]),
                ],
            )
            .unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.search(&[0.0, 1.0], 5).iter().all(|hit| hit.chunk != "old"));
    }

    #[test]
    fn upsert_rejects_dimension_mismatch() {
        let mut index = index_with(&[("a", "soup", [1.0, 0.0])]);
        let result = index.upsert("b", vec![("x".to_string(), vec![1.0, 0.0, 0.0])]);
        assert!(matches!(result, Err(AssistantError::Embedding(_))));
    }

    #[test]
    fn covers_detects_missing_and_orphaned_documents() {
        let index = index_with(&[("a", "soup", [1.0, 0.0]), ("b", "salad", [0.0, 1.0])]);

        assert!(index.covers(["a", "b"]));
        assert!(!index.covers(["a", "b", "c"]));
        assert!(!index.covers(["a"]));
    }
}
