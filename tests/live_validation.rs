use std::{env, sync::Once};

use ragdesk::{
    answer::RetrievalSettings,
    config, embedding,
    llm::get_language_model_client,
    processing::Document,
    progress::SilentProgress,
    session::Session,
};
use tempfile::tempdir;

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "mxbai-embed-large");
        set_default_env("EMBEDDING_DIMENSION", "1024");
        set_default_env("LLM_PROVIDER", "ollama");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        config::init_config().expect("live configuration");
    });
    config::get_config()
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    let config = init_config_once();
    let client = embedding::get_embedding_client(config);
    let vectors = client
        .generate_embeddings(vec!["ragdesk live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama completions"]
async fn live_ollama_completion_responds() {
    let config = init_config_once();
    let client = get_language_model_client(config);
    let reply = client
        .complete("Reply with the single word: ready")
        .await
        .expect("failed to request completion from provider");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings and completions"]
async fn live_session_answers_from_document() {
    let mut config = init_config_once().clone();
    let dir = tempdir().unwrap();
    config.index_dir = dir.path().to_path_buf();

    let mut session = Session::from_config(&config);
    let outcomes = session
        .ingest(
            Document::new("france.txt", "The capital of France is Paris."),
            &SilentProgress,
        )
        .await;
    assert!(outcomes[0].is_success(), "{}", outcomes[0].message());

    let answer = session
        .ask("What is the capital of France?", RetrievalSettings::default())
        .await
        .expect("live answer");
    assert!(answer.text.contains("Paris"), "unexpected answer: {}", answer.text);
}
