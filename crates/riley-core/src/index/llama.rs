//! llama-index persist directory reader.
//!
//! Only the two files needed for retrieval are read: the docstore for node
//! text and the simple vector store for node embeddings.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::{IndexLayout, Node, VectorIndex};
use crate::error::ChatError;

pub(super) const DOCSTORE_FILE: &str = "docstore.json";
const VECTOR_STORE_FILES: [&str; 2] = ["default__vector_store.json", "vector_store.json"];

#[derive(Deserialize)]
struct DocStoreFile {
    #[serde(rename = "docstore/data", default)]
    data: HashMap<String, StoredNode>,
}

#[derive(Deserialize)]
struct StoredNode {
    #[serde(rename = "__data__")]
    data: RawNodeData,
}

/// Older stores inline the node, some versions serialize it as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeData {
    Inline(NodeData),
    Encoded(String),
}

#[derive(Deserialize)]
struct NodeData {
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct SimpleVectorStoreFile {
    #[serde(default)]
    embedding_dict: BTreeMap<String, Vec<f32>>,
}

pub(super) fn load(dir: &Path) -> Result<VectorIndex, ChatError> {
    let docstore: DocStoreFile = read_json(dir, &dir.join(DOCSTORE_FILE))?;

    let vector_path = VECTOR_STORE_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
        .ok_or_else(|| ChatError::index_load(dir, "no vector store file found"))?;
    let vector_store: SimpleVectorStoreFile = read_json(dir, &vector_path)?;

    let mut texts: HashMap<String, NodeData> = HashMap::with_capacity(docstore.data.len());
    for (id, stored) in docstore.data {
        let data = match stored.data {
            RawNodeData::Inline(data) => data,
            RawNodeData::Encoded(raw) => serde_json::from_str(&raw).map_err(|e| {
                ChatError::index_load(dir, format!("node {} has unreadable data: {}", id, e))
            })?,
        };
        texts.insert(id, data);
    }

    let mut nodes = Vec::with_capacity(vector_store.embedding_dict.len());
    let mut vectors = Vec::with_capacity(vector_store.embedding_dict.len());
    for (id, vector) in vector_store.embedding_dict {
        let Some(data) = texts.remove(&id) else {
            return Err(ChatError::index_load(
                dir,
                format!("vector {} has no matching docstore node", id),
            ));
        };
        if data.text.trim().is_empty() {
            warn!(node_id = %id, "skipping node with empty text");
            continue;
        }
        let source = data
            .metadata
            .get("file_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        nodes.push(Node {
            id,
            text: data.text,
            source,
        });
        vectors.push(vector);
    }

    VectorIndex::new(IndexLayout::LlamaIndex, nodes, vectors)
        .map_err(|e| ChatError::index_load(dir, e))
}

fn read_json<T: DeserializeOwned>(dir: &Path, path: &Path) -> Result<T, ChatError> {
    let file = File::open(path)
        .map_err(|e| ChatError::index_load(dir, format!("failed to open {:?}: {}", path, e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ChatError::index_load(dir, format!("failed to parse {:?}: {}", path, e)))
}
