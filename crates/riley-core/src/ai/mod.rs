pub mod openai;

pub use openai::{CompletionRequest, OpenAIClient, DEFAULT_API_BASE};
