//! Mock x402 aggregator for integration tests
//!
//! Speaks enough of the upstream protocol to exercise the proxy: canned
//! chat completions, per-model scripted failures, the 402 payment
//! handshake with header verification, and an optional response delay.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use blockrun_payment::protocol::{
    PaymentOption, PaymentRequired, ResourceInfo, SignedPayment, decode_signed_payment, encode_payment_required,
};
use tokio_util::sync::CancellationToken;

/// One observed upstream call
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub model: String,
    pub payment: Option<String>,
    pub payment_signature: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
pub struct MockBuilder {
    require_payment_micros: Option<u64>,
    scripted: HashMap<String, VecDeque<(u16, String)>>,
    delay: Option<Duration>,
    content: Option<String>,
}

impl MockBuilder {
    /// Demand a signed payment of `micros` before serving completions
    pub fn require_payment(mut self, micros: u64) -> Self {
        self.require_payment_micros = Some(micros);
        self
    }

    /// Queue a raw response for the next request naming `model`
    pub fn script(mut self, model: &str, status: u16, body: &str) -> Self {
        self.scripted
            .entry(model.to_owned())
            .or_default()
            .push_back((status, body.to_owned()));
        self
    }

    /// Delay every response
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Assistant content of successful completions
    pub fn content(mut self, content: &str) -> Self {
        self.content = Some(content.to_owned());
        self
    }

    pub async fn start(self) -> anyhow::Result<MockUpstream> {
        let state = Arc::new(MockState {
            require_payment_micros: self.require_payment_micros,
            scripted: Mutex::new(self.scripted),
            delay: self.delay,
            content: self.content.unwrap_or_else(|| "Hello from the mock upstream".to_owned()),
            requests: Mutex::new(Vec::new()),
            completions: AtomicU32::new(0),
            payment_denials: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockUpstream { addr, shutdown, state })
    }
}

/// Running mock aggregator
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    require_payment_micros: Option<u64>,
    scripted: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    delay: Option<Duration>,
    content: String,
    requests: Mutex<Vec<CapturedRequest>>,
    completions: AtomicU32,
    payment_denials: AtomicU32,
}

impl MockUpstream {
    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Base URL to configure as the proxy's upstream
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Completions served (402 denials not included)
    pub fn completion_count(&self) -> u32 {
        self.state.completions.load(Ordering::Relaxed)
    }

    /// Unpaid requests bounced with 402
    pub fn payment_denial_count(&self) -> u32 {
        self.state.payment_denials.load(Ordering::Relaxed)
    }

    /// Every request that reached the completion endpoint, in order
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Decoded payment envelope of request `index`
    pub fn decoded_payment(&self, index: usize) -> Option<SignedPayment> {
        let requests = self.requests();
        let payment = requests.get(index)?.payment.as_ref()?.clone();
        decode_signed_payment(&payment).ok()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

const MOCK_PAY_TO: &str = "0x9999999999999999999999999999999999999999";
const MOCK_ASSET: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

async fn handle_chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    let model = body.get("model").and_then(|m| m.as_str()).unwrap_or("").to_owned();
    let payment = header_string(&headers, "x-payment");
    let payment_signature = header_string(&headers, "payment-signature");

    state.requests.lock().unwrap().push(CapturedRequest {
        model: model.clone(),
        payment: payment.clone(),
        payment_signature: payment_signature.clone(),
        body: body.clone(),
    });

    // The 402 handshake
    if let Some(micros) = state.require_payment_micros {
        match (&payment, &payment_signature) {
            (Some(payment), Some(signature)) => {
                if payment != signature {
                    return (StatusCode::BAD_REQUEST, "payment header mismatch").into_response();
                }
                if decode_signed_payment(payment).is_err() {
                    return (StatusCode::BAD_REQUEST, "undecodable payment").into_response();
                }
            }
            _ => {
                state.payment_denials.fetch_add(1, Ordering::Relaxed);
                let required = PaymentRequired {
                    accepts: vec![PaymentOption {
                        scheme: "exact".to_owned(),
                        network: "eip155:8453".to_owned(),
                        asset: MOCK_ASSET.to_owned(),
                        pay_to: MOCK_PAY_TO.to_owned(),
                        amount: Some(micros.to_string()),
                        max_amount_required: None,
                        max_timeout_seconds: Some(120),
                        extra: None,
                    }],
                    resource: Some(ResourceInfo {
                        url: "https://mock.upstream/v1/chat/completions".to_owned(),
                        description: "mock completion".to_owned(),
                    }),
                };
                return Response::builder()
                    .status(StatusCode::PAYMENT_REQUIRED)
                    .header("x-payment-required", encode_payment_required(&required))
                    .body(axum::body::Body::empty())
                    .unwrap();
            }
        }
    }

    // Scripted failure for this model, if any
    if let Some((status, body)) = pop_script(&state, &model) {
        return Response::builder()
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
    }

    state.completions.fetch_add(1, Ordering::Relaxed);
    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.content},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 12, "total_tokens": 22},
    }))
    .into_response()
}

fn pop_script(state: &MockState, model: &str) -> Option<(u16, String)> {
    state.scripted.lock().unwrap().get_mut(model)?.pop_front()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}
