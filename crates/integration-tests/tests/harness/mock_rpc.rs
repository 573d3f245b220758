//! Mock JSON-RPC endpoint serving scripted `eth_call` balances

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// Running mock RPC node
pub struct MockRpc {
    addr: SocketAddr,
    shutdown: CancellationToken,
    balance_micros: Arc<AtomicU64>,
}

impl MockRpc {
    /// Start with a fixed wallet balance (6-decimal smallest units)
    pub async fn start(balance_micros: u64) -> anyhow::Result<Self> {
        let balance = Arc::new(AtomicU64::new(balance_micros));

        let app = Router::new()
            .route("/", routing::post(handle_rpc))
            .with_state(Arc::clone(&balance));

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

        Ok(Self {
            addr,
            shutdown,
            balance_micros: balance,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn set_balance(&self, micros: u64) {
        self.balance_micros.store(micros, Ordering::Relaxed);
    }
}

impl Drop for MockRpc {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_rpc(State(balance): State<Arc<AtomicU64>>, Json(request): Json<serde_json::Value>) -> Json<serde_json::Value> {
    let id = request.get("id").cloned().unwrap_or(serde_json::json!(1));
    let result = format!("0x{:064x}", balance.load(Ordering::Relaxed));
    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
}
