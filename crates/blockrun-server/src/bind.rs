//! Loopback port binding with instance adoption
//!
//! Two proxies on one port help nobody. When the port is taken, probe
//! its `/health`: if the occupant is one of ours, adopt it instead of
//! fighting; otherwise retry a few times before giving up.

use std::time::Duration;

use tokio::net::TcpListener;

/// How the listen attempt resolved
pub enum BindOutcome {
    /// We own the listener
    Bound(TcpListener),
    /// A healthy instance already serves this port
    Adopted {
        /// Wallet reported by the running instance
        wallet: String,
    },
}

const BIND_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bind `127.0.0.1:port`, adopting an already-running instance if present
pub async fn bind_or_adopt(port: u16) -> anyhow::Result<BindOutcome> {
    for attempt in 1..=BIND_RETRIES {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok(BindOutcome::Bound(listener)),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if let Some(wallet) = probe_own_instance(port).await {
                    tracing::info!(port, wallet, "adopting running instance");
                    return Ok(BindOutcome::Adopted { wallet });
                }
                tracing::warn!(port, attempt, "port in use by another service, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    anyhow::bail!("port {port} is busy and not serving a blockrun health endpoint")
}

/// `GET /health` on the occupant; `Some(wallet)` if it is one of ours
async fn probe_own_instance(port: u16) -> Option<String> {
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build().ok()?;
    let response = client.get(format!("http://127.0.0.1:{port}/health")).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body: serde_json::Value = response.json().await.ok()?;
    if body.get("status").and_then(|s| s.as_str()) != Some("ok") {
        return None;
    }
    body.get("wallet").and_then(|w| w.as_str()).map(str::to_owned)
}
