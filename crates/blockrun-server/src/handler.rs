//! Route handlers and the chat-completion pipeline
//!
//! The pipeline for one chat request: parse → alias/profile resolve →
//! session pin → classify → balance gate → dedup/cache → fallback loop
//! over payment-bearing fetches → degraded detection → replay/transcode.
//! Streaming clients get headers and a heartbeat immediately; the
//! upstream is always consumed buffered.

use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use blockrun_cache::{ClaimOutcome, StoredResponse, cache_key, dedup_key, should_cache};
use blockrun_core::{Tier, estimate_tokens};
use blockrun_payment::{FetchResponse, PaymentError};
use blockrun_routing::{
    ClassifierInput, RoutingDecision, RoutingMethod, RoutingProfile, classify, fallback_chain_filtered,
    select_model,
};
use http::{HeaderMap, Method, StatusCode, header};
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::degraded::DegradedDetector;
use crate::errors::ProxyError;
use crate::sse::{DONE_FRAME, HEARTBEAT_FRAME, completion_to_frames, error_frame};
use crate::state::{ProxyInner, ProxyState};
use crate::usage::UsageRecord;
use crate::{compress, normalize};

/// Output budget assumed when the client does not send `max_tokens`
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Floor for pre-auth estimates, in micro-USD
const MIN_ESTIMATE_MICROS: u64 = 100;

// -- ancillary endpoints --

#[derive(serde::Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    full: bool,
}

/// `GET /health[?full=true]`
pub async fn health(State(state): State<ProxyState>, Query(query): Query<HealthQuery>) -> Response {
    let mut body = serde_json::json!({
        "status": "ok",
        "wallet": state.wallet_address(),
    });

    if query.full {
        match state.inner.balance.check_balance().await {
            Ok(snapshot) => body["balance"] = serde_json::to_value(&snapshot).unwrap_or_default(),
            Err(e) => body["balance_error"] = Value::String(e.to_string()),
        }
    }

    axum::Json(body).into_response()
}

/// `GET /cache`
pub async fn cache_stats(State(state): State<ProxyState>) -> Response {
    axum::Json(state.inner.response_cache.stats()).into_response()
}

#[derive(serde::Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    days: u32,
}

const fn default_stats_days() -> u32 {
    7
}

/// `GET /stats[?days=N]`
pub async fn stats(State(state): State<ProxyState>, Query(query): Query<StatsQuery>) -> Response {
    axum::Json(state.inner.usage.aggregate(query.days)).into_response()
}

/// `GET /v1/models`
pub async fn list_models(State(state): State<ProxyState>) -> Response {
    let data: Vec<Value> = state
        .inner
        .registry
        .models()
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "object": "model",
                "owned_by": "blockrun",
                "display_name": m.display_name,
                "version": m.version,
                "context_window": m.context_window,
                "max_output_tokens": m.max_output_tokens,
                "pricing": {"input_per_mtok": m.input_per_mtok, "output_per_mtok": m.output_per_mtok},
                "reasoning": m.reasoning,
                "vision": m.vision,
                "agentic": m.agentic,
            })
        })
        .collect();

    axum::Json(serde_json::json!({"object": "list", "data": data})).into_response()
}

/// Transparent proxy for `/v1/x/*` and `/v1/partner/*` (and unknown `/v1/*`)
///
/// Forwards through the payment fetch layer with minimal transformation
/// and relays the upstream response byte-for-byte.
pub async fn transparent_proxy(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_owned(), ToString::to_string);

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return ProxyError::InvalidRequest(format!("unreadable body: {e}")).into_response(),
    };

    let mut target = state.inner.config.server.upstream_url.clone();
    match target.join(&path_and_query) {
        Ok(joined) => target = joined,
        Err(e) => return ProxyError::Internal(format!("bad upstream url: {e}")).into_response(),
    }

    let payload = (!body.is_empty()).then_some(&body[..]);
    match state.inner.fetch.request(method, &target, payload, None).await {
        Ok(response) => relay(response),
        Err(e) => ProxyError::Internal(format!("upstream fetch failed: {e}")).into_response(),
    }
}

fn relay(response: FetchResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    if let Some(content_type) = response.headers.get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type.clone());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// -- chat pipeline --

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match run_pipeline(state, headers, body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

/// Everything routed; what the attempt loop needs to run detached
struct ChatJob {
    state: ProxyState,
    parsed: Value,
    candidates: Vec<String>,
    decision: RoutingDecision,
    profile_name: String,
    est_input_tokens: usize,
    max_tokens: u32,
    /// Held while this job is the dedup originator; dropping the job
    /// mid-flight (client disconnect) releases the waiters
    guard: Option<InflightGuard>,
    cache_key: Option<String>,
}

async fn run_pipeline(state: ProxyState, headers: HeaderMap, body: Bytes) -> Result<Response, ProxyError> {
    let inner = state.inner.clone();

    // 1-2. parse
    let parsed: Value =
        serde_json::from_slice(&body).map_err(|_| ProxyError::InvalidRequest("malformed JSON body".to_owned()))?;
    let messages = parsed
        .get("messages")
        .and_then(Value::as_array)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ProxyError::InvalidRequest("messages is required".to_owned()))?;
    let wants_stream = parsed.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let max_tokens = parsed
        .get("max_tokens")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_MAX_TOKENS, |v| u32::try_from(v).unwrap_or(u32::MAX));

    // 3. alias / profile resolution
    let requested = parsed.get("model").and_then(Value::as_str).unwrap_or("auto");
    let resolved = inner.registry.resolve(requested);
    let profile = RoutingProfile::parse(&resolved);

    let combined = combined_text(messages);
    let est_input_tokens = estimate_tokens(&combined);

    // 4-10. routing, session pinning, balance gate
    let (decision, candidates, profile_name) =
        route_request(&inner, messages, profile, &resolved, est_input_tokens, max_tokens, &headers).await?;

    tracing::info!(
        model = %decision.model,
        tier = %decision.tier,
        confidence = decision.confidence,
        profile = %profile_name,
        savings = decision.savings,
        stream = wants_stream,
        "routing decision"
    );

    let context = ContextHeaders::new(&inner, &decision.model, body.len());

    // 11. dedup
    let key = dedup_key(&body);
    let mut guard = None;
    match inner.dedup.claim(&key) {
        ClaimOutcome::Cached(stored) => {
            tracing::debug!(key = %key, "dedup replay");
            return Ok(render_stored(&stored, wants_stream, &decision.model, &context));
        }
        ClaimOutcome::Wait(receiver) => {
            tracing::debug!(key = %key, "awaiting in-flight duplicate");
            let stored = receiver.await.map_err(|_| ProxyError::DedupOriginFailed)?;
            return Ok(render_stored(&stored, wants_stream, &decision.model, &context));
        }
        ClaimOutcome::Originator => {
            guard = Some(InflightGuard {
                state: state.clone(),
                key: key.clone(),
                armed: true,
            });
        }
    }

    // 12. response cache (non-streaming replay only)
    let cacheable = inner.response_cache.is_enabled() && should_cache(&parsed, &headers);
    let cache_key = cacheable.then(|| cache_key(&body));
    if !wants_stream
        && let Some(cache_key) = &cache_key
        && let Some((stored, model)) = inner.response_cache.get(cache_key)
    {
        tracing::debug!(model = %model, "response cache hit");
        if let Some(guard) = guard.as_mut() {
            // Publish the cached result to any waiters before releasing
            inner.dedup.complete(&guard.key, stored.clone());
            guard.disarm();
        }
        record_usage(&inner, &decision, &profile_name, est_input_tokens, 0, true);
        return Ok(render_stored(&stored, wants_stream, &model, &context));
    }

    let job = ChatJob {
        state: state.clone(),
        parsed,
        candidates,
        decision,
        profile_name,
        est_input_tokens,
        max_tokens,
        guard,
        cache_key,
    };

    // 13-18. attempt loop, streamed or buffered
    if wants_stream {
        Ok(stream_response(job, context))
    } else {
        let (response, model_used) = job.execute().await?;
        let mut out = Response::builder()
            .status(response.status)
            .header(header::CONTENT_TYPE, "application/json");
        out = context.apply(out);
        out.header("x-model-used", model_used.as_str())
            .body(Body::from(response.body))
            .map_err(|e| ProxyError::Internal(e.to_string()))
    }
}

/// Routing steps 4-10: profile shortcut, session pin, classification,
/// overrides, tier-table pick, balance gate
#[allow(clippy::too_many_arguments)]
async fn route_request(
    inner: &ProxyInner,
    messages: &[Value],
    profile: Option<RoutingProfile>,
    resolved: &str,
    est_input_tokens: usize,
    max_tokens: u32,
    headers: &HeaderMap,
) -> Result<(RoutingDecision, Vec<String>, String), ProxyError> {
    let routing = &inner.config.routing;

    // 4. free profile shortcut
    if profile == Some(RoutingProfile::Free) {
        let decision = fixed_decision(inner, &routing.free_model, Tier::Simple, 1.0, "free profile")?;
        return Ok((decision, vec![routing.free_model.clone()], "free".to_owned()));
    }

    // Explicit concrete model: no classification-driven choice
    let Some(profile) = profile else {
        let model = inner
            .registry
            .find(resolved)
            .ok_or_else(|| ProxyError::InvalidRequest(format!("unknown model: {resolved}")))?;
        let decision = explicit_decision(inner, model, est_input_tokens, max_tokens);
        let candidates = vec![model.id.clone()];
        return finish_with_balance(inner, decision, candidates, "explicit".to_owned(), est_input_tokens, max_tokens)
            .await;
    };

    // 5. session pin
    let session_id = session_id(inner, headers);
    if let Some(session_id) = &session_id
        && let Some((model, tier)) = inner.sessions.get(session_id)
    {
        inner.sessions.touch(session_id);
        let decision = fixed_decision(inner, &model, tier, 1.0, "session pin")?;
        let table = tier_table(inner, profile, 0.0);
        let mut candidates = vec![model.clone()];
        for candidate in fallback_chain_filtered(
            tier,
            table,
            est_input_tokens + max_tokens as usize,
            &inner.registry,
            routing.context_headroom,
        ) {
            if candidate != model {
                candidates.push(candidate);
            }
        }
        return finish_with_balance(inner, decision, candidates, profile.name().to_owned(), est_input_tokens, max_tokens)
            .await;
    }

    // 6. classification + overrides
    let prompt = last_user_text(messages);
    let system_prompt = first_system_text(messages);
    let classification = classify(
        &ClassifierInput {
            user_prompt: &prompt,
            system_prompt: system_prompt.as_deref(),
            estimated_input_tokens: est_input_tokens,
        },
        routing,
        &inner.keywords,
    );

    let (mut tier, mut confidence, mut reasoning) = match classification.tier {
        Some(tier) => (tier, classification.confidence, classification.summary()),
        None => (
            routing.ambiguous_default_tier,
            classification.confidence,
            format!("ambiguous ({}), defaulting", classification.summary()),
        ),
    };

    if est_input_tokens > routing.max_tokens_force_complex {
        tier = Tier::Complex;
        confidence = 0.95;
        reasoning = format!("Input exceeds {} tokens", routing.max_tokens_force_complex);
    }

    if let Some(system) = &system_prompt
        && structured_output_re().is_match(system)
    {
        tier = tier.at_least(routing.structured_output_min_tier);
    }

    // 7. tier table (agentic sub-table of auto)
    let table = tier_table(inner, profile, classification.agentic_score);
    let profile_name = if matches!(profile, RoutingProfile::Auto)
        && (routing.agentic_mode || classification.agentic_score >= routing.agentic_threshold)
    {
        "agentic".to_owned()
    } else {
        profile.name().to_owned()
    };

    let decision = select_model(
        tier,
        confidence,
        RoutingMethod::Rules,
        reasoning,
        table,
        &inner.registry,
        est_input_tokens,
        max_tokens,
        profile,
        &routing.premium_reference_model,
    )
    .map_err(|e| ProxyError::Internal(e.to_string()))?;

    // Pin the decision for the session
    if let Some(session_id) = &session_id {
        inner.sessions.set(session_id, &decision.model, tier);
    }

    let mut candidates = fallback_chain_filtered(
        tier,
        table,
        est_input_tokens + max_tokens as usize,
        &inner.registry,
        routing.context_headroom,
    );
    candidates = inner.cooldowns.reorder(candidates);
    candidates.truncate(routing.max_fallback_attempts);

    finish_with_balance(inner, decision, candidates, profile_name, est_input_tokens, max_tokens).await
}

/// Step 10: downgrade to the free model when the wallet can't cover it
async fn finish_with_balance(
    inner: &ProxyInner,
    mut decision: RoutingDecision,
    mut candidates: Vec<String>,
    profile_name: String,
    est_input_tokens: usize,
    max_tokens: u32,
) -> Result<(RoutingDecision, Vec<String>, String), ProxyError> {
    if inner.config.payment.skip_balance_check {
        return Ok((decision, candidates, profile_name));
    }

    let Some(model) = inner.registry.find(&decision.model) else {
        return Ok((decision, candidates, profile_name));
    };
    let est_micros = preauth_estimate(model, est_input_tokens, max_tokens);
    if est_micros == 0 {
        return Ok((decision, candidates, profile_name));
    }

    match inner.balance.check_balance().await {
        Ok(snapshot) => {
            // ×1.5 headroom absorbs cached-read staleness
            let affordable = snapshot.balance_micros.saturating_mul(3) / 2;
            if snapshot.is_empty || est_micros > affordable {
                inner.observer.on_low_balance(&snapshot);
                let free = &inner.config.routing.free_model;
                decision = fixed_decision(inner, free, decision.tier, decision.confidence, "balance low, free model")?;
                candidates = vec![free.clone()];
            }
        }
        Err(e) => {
            // An RPC failure is not an empty wallet; keep the paid model
            tracing::warn!(error = %e, "balance check failed, not downgrading");
        }
    }

    Ok((decision, candidates, profile_name))
}

impl ChatJob {
    /// Run the fallback loop and publish the outcome
    async fn execute(mut self) -> Result<(FetchResponse, String), ProxyError> {
        let inner = self.state.inner.clone();
        let mut guard = self.guard.take();
        let result = self.attempt_loop(&inner).await;

        match &result {
            Ok((response, model_used, est_micros)) => {
                let stored = StoredResponse {
                    status: response.status,
                    headers: response.headers.clone(),
                    body: response.body.clone(),
                };
                if let Some(guard) = guard.as_mut() {
                    inner.dedup.complete(&guard.key, stored.clone());
                    guard.disarm();
                }
                if let Some(cache_key) = &self.cache_key {
                    inner.response_cache.set(cache_key, stored, model_used, None);
                }
                if *est_micros > 0 {
                    inner.balance.deduct_estimated(*est_micros);
                }
                let output_tokens = completion_tokens(&response.body);
                record_usage(
                    &inner,
                    &self.decision,
                    &self.profile_name,
                    self.est_input_tokens,
                    output_tokens,
                    false,
                );
            }
            Err(error) => {
                tracing::warn!(error = %error, "chat request failed");
                if let Some(guard) = guard.as_mut() {
                    inner.dedup.remove_inflight(&guard.key);
                    guard.disarm();
                }
            }
        }

        result.map(|(response, model_used, _)| (response, model_used))
    }

    /// Step 14: walk the candidate list until one model delivers
    async fn attempt_loop(&self, inner: &ProxyInner) -> Result<(FetchResponse, String, u64), ProxyError> {
        let url = inner
            .config
            .server
            .upstream_url
            .join("/v1/chat/completions")
            .map_err(|e| ProxyError::Internal(format!("bad upstream url: {e}")))?;
        let attempt_timeout = Duration::from_secs(inner.config.server.attempt_timeout_seconds);
        let wallet = inner.fetch.wallet_address();

        let mut last_error: Option<ProxyError> = None;

        for model_id in &self.candidates {
            let Some(model) = inner.registry.find(model_id) else {
                tracing::warn!(model = %model_id, "candidate missing from registry, skipping");
                continue;
            };

            // 8-9. per-attempt normalization, optional compression
            let mut body = normalize::normalize_for_model(&self.parsed, model, inner.config.routing.message_history_limit);
            if inner.config.compression.enabled {
                compress::compress_if_large(&mut body, inner.config.compression.threshold_bytes);
            }
            let bytes = serde_json::to_vec(&body).map_err(|e| ProxyError::Internal(e.to_string()))?;

            let est_micros = preauth_estimate(model, self.est_input_tokens, self.max_tokens);
            let estimate = (est_micros > 0).then_some(est_micros);

            tracing::debug!(model = %model.id, est_micros, "attempting upstream call");
            let attempt = tokio::time::timeout(
                attempt_timeout,
                inner.fetch.request(Method::POST, &url, Some(&bytes), estimate),
            )
            .await;

            let response = match attempt {
                Err(_) => {
                    last_error = Some(ProxyError::Provider {
                        status: 504,
                        message: format!("attempt timed out after {}s", attempt_timeout.as_secs()),
                    });
                    continue;
                }
                Ok(Err(PaymentError::Http(message))) => {
                    last_error = Some(ProxyError::Provider { status: 502, message });
                    continue;
                }
                // Payment protocol violations are not retryable
                Ok(Err(e)) => return Err(ProxyError::Internal(format!("payment handling failed: {e}"))),
                Ok(Ok(response)) => response,
            };

            if response.status.is_success() {
                // 15. a 200 can still be a degraded response
                if inner.detector.is_degraded(&response.body) {
                    tracing::warn!(model = %model.id, "degraded response, advancing fallback");
                    last_error = Some(ProxyError::Provider {
                        status: 503,
                        message: "degraded response".to_owned(),
                    });
                    continue;
                }
                return Ok((response, model.id.clone(), est_micros));
            }

            if response.status == StatusCode::TOO_MANY_REQUESTS {
                inner.cooldowns.mark(&model.id);
            }

            let body_text = String::from_utf8_lossy(&response.body);
            let retryable = DegradedDetector::is_provider_error_status(response.status)
                || inner.detector.matches_provider_error(&body_text);

            let error = ProxyError::from_upstream(response.status, &response.body, &wallet);
            if retryable {
                tracing::info!(model = %model.id, status = %response.status, "provider error, advancing fallback");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        // Chain exhausted: payment failures keep their specific type
        Err(match last_error {
            Some(
                error @ (ProxyError::InsufficientFunds { .. }
                | ProxyError::InvalidPayload
                | ProxyError::SettlementFailed { .. }
                | ProxyError::BudgetExceeded),
            ) => error,
            _ => ProxyError::AllProvidersUnavailable,
        })
    }
}

/// Streaming lifecycle: headers and heartbeat now, frames when ready
fn stream_response(job: ChatJob, context: ContextHeaders) -> Response {
    let heartbeat_seconds = job.state.inner.config.server.heartbeat_seconds;
    let (tx, rx) = mpsc::channel::<String>(32);

    // The very first frame is a heartbeat, queued before any work runs
    let _ = tx.try_send(HEARTBEAT_FRAME.to_owned());

    tokio::spawn(async move {
        let heartbeat = tokio::spawn({
            let tx = tx.clone();
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(heartbeat_seconds.max(1)));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if tx.send(HEARTBEAT_FRAME.to_owned()).await.is_err() {
                        break;
                    }
                }
            }
        });

        let result = job.execute().await;
        heartbeat.abort();

        match result {
            Ok((response, model_used)) => match serde_json::from_slice::<Value>(&response.body) {
                Ok(completion) => {
                    let (frames, _text) = completion_to_frames(&completion, &model_used);
                    for frame in frames {
                        if tx.send(frame).await.is_err() {
                            // Client gone; dedup and cache were already served
                            break;
                        }
                    }
                }
                Err(e) => {
                    let body = ProxyError::Internal(format!("unparseable upstream body: {e}")).to_body();
                    let _ = tx.send(error_frame(&body)).await;
                    let _ = tx.send(DONE_FRAME.to_owned()).await;
                }
            },
            Err(error) => {
                // Headers are out; the error rides the stream
                let _ = tx.send(error_frame(&error.to_body())).await;
                let _ = tx.send(DONE_FRAME.to_owned()).await;
            }
        }
    });

    sse_response(rx, &context)
}

fn sse_response(rx: mpsc::Receiver<String>, context: &ContextHeaders) -> Response {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, std::convert::Infallible>(Bytes::from(frame)), rx))
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive");
    builder = context.apply(builder);

    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Serve a stored response, transcoding to SSE when the client streams
fn render_stored(stored: &StoredResponse, wants_stream: bool, model: &str, context: &ContextHeaders) -> Response {
    if wants_stream && stored.status.is_success() {
        if let Ok(completion) = serde_json::from_slice::<Value>(&stored.body) {
            let (frames, _) = completion_to_frames(&completion, model);
            let mut payload = String::with_capacity(frames.iter().map(String::len).sum());
            for frame in frames {
                payload.push_str(&frame);
            }

            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache");
            builder = context.apply(builder);
            return builder
                .body(Body::from(payload))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }

    let mut builder = Response::builder().status(stored.status);
    if let Some(content_type) = stored.headers.get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type.clone());
    } else {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    builder = context.apply(builder);
    builder
        .body(Body::from(stored.body.clone()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Removes a dead originator's in-flight registration on drop
struct InflightGuard {
    state: ProxyState,
    key: String,
    armed: bool,
}

impl InflightGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.inner.dedup.remove_inflight(&self.key);
        }
    }
}

// -- helpers --

/// Context-size response headers
struct ContextHeaders {
    used_kb: u64,
    limit_kb: u64,
}

impl ContextHeaders {
    fn new(inner: &ProxyInner, model: &str, body_len: usize) -> Self {
        let window_tokens = inner.registry.context_window(model).unwrap_or(0);
        Self {
            used_kb: (body_len as u64).div_ceil(1024),
            // tokens ≈ 4 bytes each
            limit_kb: (u64::from(window_tokens) * 4) / 1024,
        }
    }

    fn apply(&self, builder: axum::http::response::Builder) -> axum::http::response::Builder {
        builder
            .header("x-context-used-kb", self.used_kb)
            .header("x-context-limit-kb", self.limit_kb)
    }
}

/// Pre-auth estimate: 1.2× the priced cost, floored at 100 µUSD; 0 for free models
fn preauth_estimate(model: &blockrun_core::ModelDescriptor, input_tokens: usize, max_tokens: u32) -> u64 {
    let cost = model.estimate_cost_micros(input_tokens, max_tokens as usize);
    if cost == 0 {
        return 0;
    }
    (((cost as f64) * 1.2).ceil() as u64).max(MIN_ESTIMATE_MICROS)
}

/// Decision for a model chosen outside the tier tables
fn fixed_decision(
    inner: &ProxyInner,
    model_id: &str,
    tier: Tier,
    confidence: f64,
    reasoning: &str,
) -> Result<RoutingDecision, ProxyError> {
    let model = inner
        .registry
        .find(model_id)
        .ok_or_else(|| ProxyError::Internal(format!("configured model missing from registry: {model_id}")))?;
    Ok(RoutingDecision {
        model: model.id.clone(),
        tier,
        confidence,
        method: RoutingMethod::Rules,
        reasoning: reasoning.to_owned(),
        estimated_cost: 0.0,
        baseline_cost: 0.0,
        savings: 0.0,
    })
}

/// Decision for an explicitly requested model
fn explicit_decision(
    inner: &ProxyInner,
    model: &blockrun_core::ModelDescriptor,
    est_input_tokens: usize,
    max_tokens: u32,
) -> RoutingDecision {
    let estimated_cost = model.estimate_cost(est_input_tokens, max_tokens as usize);
    let baseline_cost = inner
        .registry
        .find(&inner.config.routing.premium_reference_model)
        .map_or(0.0, |reference| reference.estimate_cost(est_input_tokens, max_tokens as usize));
    RoutingDecision {
        model: model.id.clone(),
        tier: Tier::Medium,
        confidence: 1.0,
        method: RoutingMethod::Rules,
        reasoning: "explicit model request".to_owned(),
        estimated_cost,
        baseline_cost,
        savings: 0.0,
    }
}

fn tier_table<'a>(
    inner: &'a ProxyInner,
    profile: RoutingProfile,
    agentic_score: f64,
) -> &'a blockrun_config::TierTable {
    let profiles = &inner.config.routing.profiles;
    match profile {
        RoutingProfile::Eco => &profiles.eco,
        RoutingProfile::Premium => &profiles.premium,
        RoutingProfile::Auto | RoutingProfile::Free => {
            if inner.config.routing.agentic_mode || agentic_score >= inner.config.routing.agentic_threshold {
                &profiles.agentic
            } else {
                &profiles.auto
            }
        }
    }
}

fn session_id(inner: &ProxyInner, headers: &HeaderMap) -> Option<String> {
    if !inner.config.session.enabled {
        return None;
    }
    headers
        .get(inner.config.session.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn record_usage(
    inner: &ProxyInner,
    decision: &RoutingDecision,
    profile_name: &str,
    input_tokens: usize,
    output_tokens: usize,
    cached: bool,
) {
    inner.usage.record(UsageRecord {
        at: SystemTime::now(),
        model: decision.model.clone(),
        tier: decision.tier,
        profile: profile_name.to_owned(),
        input_tokens,
        output_tokens,
        cost_usd: decision.estimated_cost,
        saved_usd: decision.savings * decision.baseline_cost,
        cached,
    });
}

fn completion_tokens(body: &[u8]) -> usize {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("usage")?.get("completion_tokens")?.as_u64())
        .map_or(0, |n| n as usize)
}

/// Text of a message's content (string or text parts)
fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn combined_text(messages: &[Value]) -> String {
    messages.iter().map(message_text).collect::<Vec<_>>().join("\n")
}

fn last_user_text(messages: &[Value]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .map(message_text)
        .unwrap_or_default()
}

fn first_system_text(messages: &[Value]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("system"))
        .map(message_text)
}

fn structured_output_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)json|structured|schema").expect("must be valid regex"))
}
