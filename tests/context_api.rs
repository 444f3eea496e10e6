//! Anthropic messages client tests against a mock endpoint.

use httpmock::prelude::*;
use serde_json::json;

use sfs_pipeline::enrich::{
    generate_context_prefixes, AnthropicClient, ChunkForContext, ContextModel, DocumentForContext,
};
use sfs_pipeline::types::{ContextBudget, RetryConfig};

#[tokio::test]
async fn complete_returns_first_text_block() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "anthropic-key")
            .header("anthropic-version", "2023-06-01")
            .json_body_partial(
                json!({
                    "model": "claude-haiku-4-5-20251001",
                    "messages": [{"role": "user", "content": "hej"}],
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "content": [
                {"type": "thinking", "text": "ignored"},
                {"type": "text", "text": "svar"},
            ]
        }));
    });

    let client = AnthropicClient::new("anthropic-key", "claude-haiku-4-5-20251001")
        .with_base_url(server.base_url());
    let text = client.complete("hej").await.unwrap();

    mock.assert();
    assert_eq!(text, "svar");
}

#[tokio::test]
async fn non_success_status_is_a_provider_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(529).body("overloaded");
    });

    let client = AnthropicClient::new("anthropic-key", "claude-haiku-4-5-20251001")
        .with_base_url(server.base_url());
    let err = client.complete("hej").await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("529"));
}

#[tokio::test]
async fn response_without_text_block_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200).json_body(json!({"content": []}));
    });

    let client = AnthropicClient::new("anthropic-key", "claude-haiku-4-5-20251001")
        .with_base_url(server.base_url());
    let err = client.complete("hej").await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn enrichment_retries_then_collects_prefixes() {
    let server = MockServer::start();
    let mut failure = server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(500).body("transient");
    });

    let doc = DocumentForContext {
        source_id: "doc-1".into(),
        title: "Semesterlag".into(),
        document_number: "1977:480".into(),
        markdown: "# Semesterlag\n\nArbetstagare har rätt till semester.".into(),
    };
    let chunks = vec![ChunkForContext {
        path: "kap0.§1".into(),
        content: "Arbetstagare har rätt till semesterförmåner.".into(),
    }];
    let retry = RetryConfig {
        max_attempts: 2,
        delay: std::time::Duration::from_millis(10),
    };

    let client = AnthropicClient::new("anthropic-key", "claude-haiku-4-5-20251001")
        .with_base_url(server.base_url());

    // First pass: every attempt fails, the last error propagates.
    let err = generate_context_prefixes(&client, &doc, &chunks, &ContextBudget::default(), &retry)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(failure.hits(), 2);

    failure.delete();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200).json_body(json!({
            "content": [{
                "type": "text",
                "text": "```json\n{\"prefixes\": {\"kap0.§1\": \"Semesterlagens inledande bestämmelse.\"}}\n```",
            }]
        }));
    });

    let prefixes =
        generate_context_prefixes(&client, &doc, &chunks, &ContextBudget::default(), &retry)
            .await
            .unwrap();
    assert_eq!(
        prefixes.get("kap0.§1").map(String::as_str),
        Some("Semesterlagens inledande bestämmelse.")
    );
}
