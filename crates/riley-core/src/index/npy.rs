//! Local index layout: an `.npy` matrix plus per-row JSON metadata.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use serde::Deserialize;

use super::{IndexLayout, Node, VectorIndex};
use crate::error::ChatError;

pub(super) const EMBEDDINGS_FILE: &str = "chunk_embeddings.npy";
const METADATA_FILE: &str = "chunk_metadata.json";

#[derive(Deserialize)]
struct Metadata {
    text: String,
    #[serde(default)]
    source: Option<String>,
}

/// Load embeddings from .npy file and metadata from JSON
pub(super) fn load(dir: &Path) -> Result<VectorIndex, ChatError> {
    let embeddings_path = dir.join(EMBEDDINGS_FILE);
    let metadata_path = dir.join(METADATA_FILE);

    let embeddings_file = File::open(&embeddings_path).map_err(|e| {
        ChatError::index_load(dir, format!("Failed to open embeddings file {:?}: {}", embeddings_path, e))
    })?;
    let embeddings: Array2<f32> = Array2::read_npy(embeddings_file)
        .map_err(|e| ChatError::index_load(dir, format!("Failed to read .npy file: {}", e)))?;

    let metadata_file = File::open(&metadata_path).map_err(|e| {
        ChatError::index_load(dir, format!("Failed to open metadata file {:?}: {}", metadata_path, e))
    })?;
    let metadata: Vec<Metadata> = serde_json::from_reader(BufReader::new(metadata_file))
        .map_err(|e| ChatError::index_load(dir, format!("Failed to parse metadata: {}", e)))?;

    let nodes = metadata
        .into_iter()
        .enumerate()
        .map(|(i, m)| Node {
            id: format!("chunk-{}", i),
            text: m.text,
            source: m.source,
        })
        .collect();

    VectorIndex::from_matrix(IndexLayout::Npy, nodes, embeddings)
        .map_err(|e| ChatError::index_load(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::write_npy;
    use std::fs;

    #[test]
    fn test_load_npy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let matrix: Array2<f32> = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        write_npy(dir.path().join(EMBEDDINGS_FILE), &matrix).unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            r#"[{"text": "Yellow & Orange: carrots, mango", "source": "rainbow.csv"},
                {"text": "White, Tan & Brown: mushrooms, garlic"}]"#,
        )
        .unwrap();

        let index = load(dir.path()).unwrap();
        assert_eq!(index.layout(), IndexLayout::Npy);
        assert_eq!(index.len(), 2);

        let hits = index.search(&[0.0, 0.1, 0.9], 1).unwrap();
        assert_eq!(hits[0].0.id, "chunk-1");
        assert!(hits[0].0.text.contains("mushrooms"));
        assert!(hits[0].0.source.is_none());
    }

    #[test]
    fn test_row_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let matrix: Array2<f32> = array![[1.0, 0.0], [0.0, 1.0]];
        write_npy(dir.path().join(EMBEDDINGS_FILE), &matrix).unwrap();
        fs::write(dir.path().join(METADATA_FILE), r#"[{"text": "only one"}]"#).unwrap();

        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, ChatError::IndexLoad { .. }));
        assert!(err.to_string().contains("doesn't match"));
    }

    #[test]
    fn test_missing_metadata_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let matrix: Array2<f32> = array![[1.0, 0.0]];
        write_npy(dir.path().join(EMBEDDINGS_FILE), &matrix).unwrap();

        assert!(matches!(load(dir.path()), Err(ChatError::IndexLoad { .. })));
    }

    #[test]
    fn test_garbage_npy_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(EMBEDDINGS_FILE), b"not a numpy file").unwrap();
        fs::write(dir.path().join(METADATA_FILE), "[]").unwrap();

        assert!(matches!(load(dir.path()), Err(ChatError::IndexLoad { .. })));
    }
}
