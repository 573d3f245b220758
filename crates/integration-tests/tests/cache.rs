//! Response cache behavior through the HTTP surface

mod harness;

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
async fn repeat_requests_hit_the_cache() {
    let upstream = MockUpstream::start().await.unwrap();
    // Dedup replay off, so only the response cache can answer twice
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).without_dedup_replay().build(),
    )
    .await
    .unwrap();

    for _ in 0..3 {
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

    let stats: serde_json::Value = server
        .client()
        .get(server.url("/cache"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["enabled"], true);
    assert_eq!(stats["size"], 1);
    assert_eq!(stats["hits"], 2);
}

#[tokio::test]
async fn no_cache_body_flag_bypasses() {
    let upstream = MockUpstream::start().await.unwrap();
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).without_dedup_replay().build(),
    )
    .await
    .unwrap();

    let mut body = chat_body();
    body["no_cache"] = serde_json::json!(true);

    for _ in 0..2 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(upstream.completion_count(), 2);
}

#[tokio::test]
async fn cache_control_header_bypasses() {
    let upstream = MockUpstream::start().await.unwrap();
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).without_dedup_replay().build(),
    )
    .await
    .unwrap();

    for _ in 0..2 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .header("cache-control", "no-cache")
            .json(&chat_body())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(upstream.completion_count(), 2);
}

#[tokio::test]
async fn errors_are_never_cached() {
    let error = r#"{"error":{"message":"service unavailable"}}"#;
    let upstream = MockUpstream::builder()
        .script("openai/gpt-4o-mini", 503, error)
        .script("deepseek/deepseek-chat", 503, error)
        .script("meta/llama-3.1-8b", 503, error)
        .start()
        .await
        .unwrap();
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).without_dedup_replay().build(),
    )
    .await
    .unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let stats: serde_json::Value = server
        .client()
        .get(server.url("/cache"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["size"], 0);
}

#[tokio::test]
async fn stream_and_non_stream_share_a_cache_entry() {
    let upstream = MockUpstream::start().await.unwrap();
    let server = TestServer::start(
        ConfigBuilder::new(&upstream.base_url()).without_dedup_replay().build(),
    )
    .await
    .unwrap();

    // Warm the cache with a buffered request
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // The same request with stream:true hashes to the same key (stream is
    // non-semantic), but streaming requests bypass cache lookup, so the
    // upstream is called again
    let mut body = chat_body();
    body["stream"] = serde_json::json!(true);
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let _ = resp.bytes().await;

    assert_eq!(upstream.completion_count(), 2);
}
