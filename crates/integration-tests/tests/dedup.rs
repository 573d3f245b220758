//! In-flight coalescing and short-window replay

mod harness;

use std::time::Duration;

use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;

fn chat_body() -> serde_json::Value {
    serde_json::json!({
        "model": "blockrun/auto",
        "messages": [{"role": "user", "content": "What is the capital of France?"}],
        "max_tokens": 40,
    })
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_upstream_call() {
    let upstream = MockUpstream::builder()
        .delay(Duration::from_millis(300))
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    let first = server.client().post(server.url("/v1/chat/completions")).json(&chat_body()).send();
    let second = server.client().post(server.url("/v1/chat/completions")).json(&chat_body()).send();

    let (first, second) = tokio::join!(first, second);
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);

    let body_a = first.text().await.unwrap();
    let body_b = second.text().await.unwrap();
    assert_eq!(body_a, body_b);

    assert_eq!(upstream.completion_count(), 1, "duplicates must coalesce");
}

#[tokio::test]
async fn key_ignores_field_order() {
    let upstream = MockUpstream::builder()
        .delay(Duration::from_millis(300))
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    let reordered = serde_json::json!({
        "max_tokens": 40,
        "messages": [{"content": "What is the capital of France?", "role": "user"}],
        "model": "blockrun/auto",
    });

    let first = server.client().post(server.url("/v1/chat/completions")).json(&chat_body()).send();
    let second = server.client().post(server.url("/v1/chat/completions")).json(&reordered).send();

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().status(), 200);
    assert_eq!(second.unwrap().status(), 200);
    assert_eq!(upstream.completion_count(), 1);
}

#[tokio::test]
async fn completed_requests_replay_within_the_window() {
    let upstream = MockUpstream::start().await.unwrap();
    // Cache disabled so the replay can only come from the dedup window
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).with_cache_disabled().build(),
    )
    .await
    .unwrap();

    for _ in 0..2 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&chat_body())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(upstream.completion_count(), 1);
}

#[tokio::test]
async fn different_requests_are_not_coalesced() {
    let upstream = MockUpstream::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    let other = serde_json::json!({
        "model": "blockrun/auto",
        "messages": [{"role": "user", "content": "What is the capital of Spain?"}],
        "max_tokens": 40,
    });

    let first = server.client().post(server.url("/v1/chat/completions")).json(&chat_body()).send();
    let second = server.client().post(server.url("/v1/chat/completions")).json(&other).send();

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().status(), 200);
    assert_eq!(second.unwrap().status(), 200);
    assert_eq!(upstream.completion_count(), 2);
}
