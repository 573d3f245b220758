//! The x402 handshake end to end

mod harness;

use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;

fn chat_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "blockrun/auto",
        "messages": [{"role": "user", "content": content}],
        "max_tokens": 40,
    })
}

#[tokio::test]
async fn handshake_signs_and_retries_once() {
    let upstream = MockUpstream::builder().require_payment(1500).start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("What is the capital of France?"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(upstream.payment_denial_count(), 1);
    assert_eq!(upstream.completion_count(), 1);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 2);

    // First call carried no payment; the retry carried both headers with
    // identical bytes
    assert!(requests[0].payment.is_none());
    let paid = &requests[1];
    assert_eq!(paid.payment.as_deref(), paid.payment_signature.as_deref());

    let envelope = upstream.decoded_payment(1).unwrap();
    assert_eq!(envelope.x402_version, 2);
    assert_eq!(envelope.accepted.pay_to, "0x9999999999999999999999999999999999999999");
    assert_eq!(envelope.payload.authorization.value, "1500");
    assert!(envelope.payload.signature.starts_with("0x"));
    // 32-byte nonce as 0x-hex
    assert_eq!(envelope.payload.authorization.nonce.len(), 66);

    let valid_after: u64 = envelope.payload.authorization.valid_after.parse().unwrap();
    let valid_before: u64 = envelope.payload.authorization.valid_before.parse().unwrap();
    assert!(valid_before > valid_after);
    assert_eq!(valid_before - valid_after, 600 + 120);
}

#[tokio::test]
async fn cached_parameters_enable_preauth() {
    let upstream = MockUpstream::builder().require_payment(1500).start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    // First request pays the full handshake
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("What is the capital of France?"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(upstream.payment_denial_count(), 1);

    // Second (different) request signs up front from cached parameters:
    // no further 402 round trip
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("What is the capital of Spain?"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(upstream.payment_denial_count(), 1);
    assert_eq!(upstream.completion_count(), 2);

    // The pre-authorized call still carried both identical headers
    let requests = upstream.requests();
    let last = requests.last().unwrap();
    assert!(last.payment.is_some());
    assert_eq!(last.payment.as_deref(), last.payment_signature.as_deref());
}

#[tokio::test]
async fn nonces_are_unique_per_payment() {
    let upstream = MockUpstream::builder().require_payment(900).start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&upstream.base_url()).build()).await.unwrap();

    for content in ["first question", "second question"] {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&chat_body(content))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let requests = upstream.requests();
    let nonces: Vec<String> = (0..requests.len())
        .filter_map(|i| upstream.decoded_payment(i))
        .map(|envelope| envelope.payload.authorization.nonce)
        .collect();
    assert!(nonces.len() >= 2);
    let unique: std::collections::HashSet<&String> = nonces.iter().collect();
    assert_eq!(unique.len(), nonces.len(), "nonces must never repeat");
}
