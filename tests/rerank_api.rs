//! Rerank client tests against a mock Cohere endpoint.
//!
//! Every failure path must degrade to the caller's original ordering;
//! search never breaks because reranking did.

use httpmock::prelude::*;
use serde_json::json;

use sfs_pipeline::rerank::{RerankCandidate, RerankClient};
use sfs_pipeline::types::RerankConfig;

fn candidates(texts: &[&str]) -> Vec<RerankCandidate<String>> {
    texts
        .iter()
        .map(|t| RerankCandidate {
            text: t.to_string(),
            payload: t.to_string(),
        })
        .collect()
}

#[tokio::test]
async fn reorders_by_provider_relevance() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/rerank")
            .header("authorization", "Bearer cohere-key")
            .json_body(json!({
                "model": "rerank-v4.0-pro",
                "query": "uppsägningstid",
                "documents": ["om semester", "om uppsägning", "om arbetsmiljö"],
                "top_n": 3,
            }));
        then.status(200).json_body(json!({
            "results": [
                {"index": 1, "relevance_score": 0.98},
                {"index": 2, "relevance_score": 0.40},
                {"index": 0, "relevance_score": 0.12},
            ]
        }));
    });

    let client = RerankClient::new(Some("cohere-key".into()), RerankConfig::default())
        .with_base_url(server.base_url());
    let outcome = client
        .rerank(
            "uppsägningstid",
            candidates(&["om semester", "om uppsägning", "om arbetsmiljö"]),
            None,
        )
        .await;

    mock.assert();
    assert!(outcome.reranked);
    let ordered: Vec<&str> = outcome.results.iter().map(|r| r.payload.as_str()).collect();
    assert_eq!(ordered, vec!["om uppsägning", "om arbetsmiljö", "om semester"]);
    assert!((outcome.results[0].relevance_score - 0.98).abs() < f64::EPSILON);
}

#[tokio::test]
async fn top_n_is_forwarded() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/rerank")
            .json_body_partial(json!({"top_n": 1}).to_string());
        then.status(200).json_body(json!({
            "results": [{"index": 0, "relevance_score": 0.5}]
        }));
    });

    let client = RerankClient::new(Some("cohere-key".into()), RerankConfig::default())
        .with_base_url(server.base_url());
    let outcome = client
        .rerank("fråga", candidates(&["ett", "två"]), Some(1))
        .await;

    mock.assert();
    assert_eq!(outcome.results.len(), 1);
}

#[tokio::test]
async fn server_error_falls_back_to_original_order() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v2/rerank");
        then.status(500).body("internal error");
    });

    let client = RerankClient::new(Some("cohere-key".into()), RerankConfig::default())
        .with_base_url(server.base_url());
    let outcome = client
        .rerank("fråga", candidates(&["ett", "två", "tre"]), None)
        .await;

    assert!(!outcome.reranked);
    let ordered: Vec<&str> = outcome.results.iter().map(|r| r.payload.as_str()).collect();
    assert_eq!(ordered, vec!["ett", "två", "tre"]);
    assert!(outcome.results.iter().all(|r| r.relevance_score == 0.0));
}

#[tokio::test]
async fn unreachable_endpoint_falls_back_to_original_order() {
    let client = RerankClient::new(Some("cohere-key".into()), RerankConfig::default())
        .with_base_url("http://127.0.0.1:1");
    let outcome = client.rerank("fråga", candidates(&["ett", "två"]), None).await;

    assert!(!outcome.reranked);
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test]
async fn candidate_overflow_is_truncated_before_sending() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/rerank")
            .json_body_partial(json!({"documents": ["ett", "två"], "top_n": 2}).to_string());
        then.status(200).json_body(json!({
            "results": [
                {"index": 0, "relevance_score": 0.9},
                {"index": 1, "relevance_score": 0.8},
            ]
        }));
    });

    let config = RerankConfig {
        max_documents: 2,
        ..Default::default()
    };
    let client =
        RerankClient::new(Some("cohere-key".into()), config).with_base_url(server.base_url());
    let outcome = client
        .rerank("fråga", candidates(&["ett", "två", "tre"]), None)
        .await;

    mock.assert();
    assert!(outcome.reranked);
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test]
async fn garbage_response_body_falls_back() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v2/rerank");
        then.status(200).body("not json");
    });

    let client = RerankClient::new(Some("cohere-key".into()), RerankConfig::default())
        .with_base_url(server.base_url());
    let outcome = client.rerank("fråga", candidates(&["ett", "två"]), None).await;

    assert!(!outcome.reranked);
    assert_eq!(outcome.results.len(), 2);
}
