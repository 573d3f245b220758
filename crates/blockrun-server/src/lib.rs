//! Proxy core: HTTP surface and request orchestration
//!
//! Assembles the axum router over the shared [`ProxyState`], binds the
//! loopback port (adopting an already-running instance when present),
//! and serves until cancelled.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod bind;
mod compress;
mod degraded;
mod errors;
mod handler;
mod normalize;
mod observer;
mod sse;
mod state;
mod usage;

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use blockrun_config::Config;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use bind::{BindOutcome, bind_or_adopt};
pub use errors::ProxyError;
pub use observer::{BalanceObserver, LogBalanceObserver};
pub use state::ProxyState;
pub use usage::{InMemoryUsageLog, UsageRecord, UsageRecorder, UsageSummary};

/// Assembled server with all routes and state
pub struct Server {
    router: Router,
    state: ProxyState,
    port: u16,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a subsystem rejects its configuration
    /// (wallet key, token contract, detection patterns)
    pub fn new(config: Config, shutdown: &CancellationToken) -> anyhow::Result<Self> {
        let port = config.server.port;
        let state = ProxyState::from_config(config, shutdown)?;
        let router = build_router(state.clone());
        Ok(Self { router, state, port })
    }

    /// Wallet address payments are signed from
    pub fn wallet_address(&self) -> String {
        self.state.wallet_address()
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind and serve until the cancellation token fires
    ///
    /// When the port is already held by a healthy blockrun instance, the
    /// existing server is adopted and this call returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or axum's serve loop errors
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = match bind::bind_or_adopt(self.port).await? {
            bind::BindOutcome::Bound(listener) => listener,
            bind::BindOutcome::Adopted { wallet } => {
                tracing::info!(wallet, "another instance is already serving, exiting");
                return Ok(());
            }
        };

        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, wallet = %self.state.wallet_address(), "proxy listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

/// Build the route table over the shared state
fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/cache", get(handler::cache_stats))
        .route("/stats", get(handler::stats))
        .route("/v1/models", get(handler::list_models))
        // Partner surfaces pass through the payment layer untouched
        .route("/v1/x/{*rest}", any(handler::transparent_proxy))
        .route("/v1/partner/{*rest}", any(handler::transparent_proxy))
        .route("/v1/chat/completions", post(handler::chat_completions))
        // Remaining /v1 endpoints are forwarded upstream as-is
        .route("/v1/{*rest}", any(handler::transparent_proxy))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> axum::response::Response {
    (
        http::StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "error": {"message": "not found", "type": "proxy_error"}
        })),
    )
        .into_response()
}
