use std::fs;
use std::path::Path;
use std::sync::Arc;

use riley_core::{
    embedder_for, load_index, ChatError, ChatRole, ChatSession, Config, EngineSettings,
    IndexLayout, OpenAIClient, RagChatEngine, GREETING,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION: &str = "What fruit is high in vitamin C?";

fn write_llama_index(dir: &Path) {
    let docstore = json!({
        "docstore/data": {
            "citrus": {"__data__": {
                "text": "Yellow & Orange: oranges, lemons. Recipe: citrus salad.",
                "metadata": {"file_name": "rainbow.csv"}
            }},
            "roots": {"__data__": {
                "text": "White, Tan & Brown: potatoes, ginger. Recipe: ginger mash.",
                "metadata": {}
            }}
        }
    });
    let vectors = json!({
        "embedding_dict": {
            "citrus": [0.9, 0.1, 0.0],
            "roots": [0.0, 0.2, 0.9]
        }
    });
    let write = |name: &str, value: &Value| {
        fs::write(dir.join(name), serde_json::to_vec(value).unwrap()).unwrap();
    };
    write("docstore.json", &docstore);
    write("default__vector_store.json", &vectors);
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [1.0, 0.0, 0.0]}]
        })))
        .mount(server)
        .await;
}

fn engine_for(server: &MockServer, index_dir: &Path) -> RagChatEngine {
    let config = Config {
        openai_api_key: Some("sk-test".to_string()),
        api_base: server.uri(),
        index_dir: index_dir.to_path_buf(),
        similarity_top_k: 1,
        ..Config::default()
    };

    let index = Arc::new(load_index(&config.index_dir).unwrap());
    assert_eq!(index.layout(), IndexLayout::LlamaIndex);

    let client = OpenAIClient::from_config(&config).unwrap();
    let embedder = embedder_for(index.layout(), &client, &config);
    RagChatEngine::new(index, embedder, client, EngineSettings::from(&config))
}

#[tokio::test]
async fn test_vitamin_c_question_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_llama_index(dir.path());

    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("oranges, lemons"))
        .and(body_string_contains(QUESTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Oranges! Try the citrus salad."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut session = ChatSession::new();
    assert_eq!(session.renderable_transcript().len(), 1);

    session.submit_user_message(QUESTION).unwrap();
    assert_eq!(session.renderable_transcript().len(), 2);
    assert!(session.awaiting_response());
    let query = session.pending_query().unwrap();
    assert!(query.contains(GREETING));
    assert_eq!(query.matches(QUESTION).count(), 2);

    let response = session.dispatch_if_pending(&engine).await.unwrap().unwrap();
    assert_eq!(response.sources[0].node_id, "citrus");

    let transcript = session.renderable_transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[2].role, ChatRole::Assistant);
    assert_eq!(transcript[2].content, "Oranges! Try the citrus salad.");
    assert!(!session.awaiting_response());
}

#[tokio::test]
async fn test_outage_then_retry_reuses_prompt() {
    let dir = tempfile::tempdir().unwrap();
    write_llama_index(dir.path());

    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Lemons and oranges."}}]
        })))
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut session = ChatSession::new();
    session.submit_user_message(QUESTION).unwrap();
    let query = session.pending_query().unwrap().to_string();

    let err = session.dispatch_if_pending(&engine).await.unwrap_err();
    assert!(matches!(err, ChatError::ModelStatus { status: 500, .. }));
    assert!(err.is_retryable());
    assert_eq!(session.pending_query(), Some(query.as_str()));
    assert_eq!(session.renderable_transcript().len(), 2);

    session.dispatch_if_pending(&engine).await.unwrap();
    assert_eq!(session.renderable_transcript().len(), 3);

    // nothing pending now, so no further request goes out
    assert!(session.dispatch_if_pending(&engine).await.unwrap().is_none());

    let chat_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/chat/completions")
        .count();
    assert_eq!(chat_calls, 2);
}

#[test]
fn test_missing_index_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_index(dir.path().join("index.vecstore")).unwrap_err();
    assert!(matches!(err, ChatError::IndexLoad { .. }));
    assert!(!err.is_retryable());
}
