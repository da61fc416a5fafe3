//! Persisted vector index, loaded once at startup and read-only afterwards.

mod llama;
mod npy;

use std::path::Path;

use ndarray::Array2;
use tracing::info;

use crate::error::ChatError;

/// On-disk layouts the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLayout {
    /// llama-index persist directory: `docstore.json` + simple vector store.
    /// Embedded with the hosted embedding model.
    LlamaIndex,
    /// `chunk_embeddings.npy` + `chunk_metadata.json`, embedded locally.
    Npy,
}

impl IndexLayout {
    pub fn detect(dir: &Path) -> Option<Self> {
        if dir.join(llama::DOCSTORE_FILE).exists() {
            Some(IndexLayout::LlamaIndex)
        } else if dir.join(npy::EMBEDDINGS_FILE).exists() {
            Some(IndexLayout::Npy)
        } else {
            None
        }
    }
}

/// A retrievable chunk of the source documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
}

#[derive(Debug)]
pub struct VectorIndex {
    layout: IndexLayout,
    nodes: Vec<Node>,
    embeddings: Array2<f32>,
}

impl VectorIndex {
    /// Build an index from nodes and their vectors (one row per node).
    pub fn new(
        layout: IndexLayout,
        nodes: Vec<Node>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, ChatError> {
        if nodes.len() != vectors.len() {
            return Err(ChatError::Config(format!(
                "{} nodes but {} vectors",
                nodes.len(),
                vectors.len()
            )));
        }

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(ChatError::Config(format!(
                "vector for node {} has dimension {}, expected {}",
                nodes[bad].id,
                vectors[bad].len(),
                dim
            )));
        }

        let rows = vectors.len();
        let flat: Vec<f32> = vectors.into_iter().flatten().collect();
        let embeddings = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| ChatError::Config(format!("invalid embedding matrix: {}", e)))?;

        Self::from_matrix(layout, nodes, embeddings)
    }

    fn from_matrix(
        layout: IndexLayout,
        nodes: Vec<Node>,
        embeddings: Array2<f32>,
    ) -> Result<Self, ChatError> {
        if embeddings.nrows() != nodes.len() {
            return Err(ChatError::Config(format!(
                "Embeddings count ({}) doesn't match metadata count ({})",
                embeddings.nrows(),
                nodes.len()
            )));
        }
        Ok(Self {
            layout,
            nodes,
            embeddings,
        })
    }

    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Nodes most similar to `query`, best first, at most `limit` of them.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(&Node, f32)>, ChatError> {
        if query.len() != self.dimension() {
            return Err(ChatError::ModelResponse(format!(
                "query embedding has dimension {}, index expects {}",
                query.len(),
                self.dimension()
            )));
        }

        let mut scores: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let score = match row.as_slice() {
                    Some(slice) => cosine_similarity(slice, query),
                    None => cosine_similarity(&row.to_vec(), query),
                };
                (i, score)
            })
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(limit);

        Ok(scores
            .into_iter()
            .map(|(i, score)| (&self.nodes[i], score))
            .collect())
    }
}

/// Load the persisted index at `dir`.
pub fn load_index(dir: impl AsRef<Path>) -> Result<VectorIndex, ChatError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ChatError::index_load(dir, "directory does not exist"));
    }

    let layout = IndexLayout::detect(dir).ok_or_else(|| {
        ChatError::index_load(
            dir,
            format!(
                "no {} or {} found",
                llama::DOCSTORE_FILE,
                npy::EMBEDDINGS_FILE
            ),
        )
    })?;

    let index = match layout {
        IndexLayout::LlamaIndex => llama::load(dir)?,
        IndexLayout::Npy => npy::load(dir)?,
    };

    if index.is_empty() {
        return Err(ChatError::index_load(dir, "index contains no nodes"));
    }

    info!(
        path = %dir.display(),
        layout = ?index.layout(),
        nodes = index.len(),
        dimension = index.dimension(),
        "index loaded"
    );
    Ok(index)
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            text: format!("text of {}", id),
            source: None,
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = VectorIndex::new(
            IndexLayout::Npy,
            vec![node("a"), node("b"), node("c")],
            vec![vec![1.0, 0.0], vec![0.7, 0.7], vec![0.0, 1.0]],
        )
        .unwrap();

        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|(n, _)| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_search_limit_larger_than_index() {
        let index =
            VectorIndex::new(IndexLayout::Npy, vec![node("a")], vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_search_rejects_wrong_dimension() {
        let index =
            VectorIndex::new(IndexLayout::Npy, vec![node("a")], vec![vec![1.0, 0.0]]).unwrap();
        let err = index.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, ChatError::ModelResponse(_)));
    }

    #[test]
    fn test_new_rejects_ragged_vectors() {
        let result = VectorIndex::new(
            IndexLayout::LlamaIndex,
            vec![node("a"), node("b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_index(dir.path().join("index.vecstore")).unwrap_err();
        assert!(matches!(err, ChatError::IndexLoad { .. }));
    }

    #[test]
    fn test_load_unrecognized_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();
        let err = load_index(dir.path()).unwrap_err();
        assert!(err.to_string().contains("docstore.json"));
    }
}
