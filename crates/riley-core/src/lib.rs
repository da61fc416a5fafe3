pub mod ai;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod index;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionRequest, OpenAIClient};
pub use config::Config;
pub use embeddings::{embedder_for, Embedder, LocalEmbedder, RemoteEmbedder, LOCAL_EMBEDDING_MODEL};
pub use engine::{ChatEngine, EngineSettings, RagChatEngine};
pub use error::ChatError;
pub use index::{load_index, IndexLayout, Node, VectorIndex};
pub use session::{ChatSession, TurnState, GREETING};
pub use state::{ChatMessage, ChatResponse, ChatRole, SourceRef};
