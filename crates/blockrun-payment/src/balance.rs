//! Cached on-chain balance reads
//!
//! Wraps an ERC-20 `balanceOf` reader behind the [`ErcClient`] seam and
//! keeps one cached balance with a short TTL. RPC failures surface as a
//! typed error so callers can tell "the read failed" apart from "the
//! wallet is empty".

use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use url::Url;

use crate::error::PaymentError;

/// Seam for ERC-20 balance reads
#[async_trait]
pub trait ErcClient: Send + Sync {
    /// `balanceOf(owner)` on the given token contract, in smallest units
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, PaymentError>;
}

/// `eth_call`-based implementation over plain JSON-RPC
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
}

impl JsonRpcClient {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

/// `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

#[async_trait]
impl ErcClient for JsonRpcClient {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, PaymentError> {
        let data = format!("0x{BALANCE_OF_SELECTOR}{:0>64}", alloy::primitives::hex::encode(owner));
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{"to": format!("{token:#x}"), "data": data}, "latest"],
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Rpc(e.to_string()))?;

        let body: serde_json::Value = response.json().await.map_err(|e| PaymentError::Rpc(e.to_string()))?;

        if let Some(error) = body.get("error") {
            return Err(PaymentError::Rpc(error.to_string()));
        }

        let result = body
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| PaymentError::Rpc("eth_call returned no result".to_owned()))?;

        let hex = result.strip_prefix("0x").unwrap_or(result);
        U256::from_str_radix(hex, 16).map_err(|e| PaymentError::Rpc(format!("malformed balance: {e}")))
    }
}

/// Point-in-time view of the wallet
#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceSnapshot {
    /// Balance in the token's smallest unit (6 decimals)
    pub balance_micros: u64,
    /// Balance in USD
    pub balance_usd: f64,
    /// Below the low-balance threshold
    pub is_low: bool,
    /// Below the empty threshold
    pub is_empty: bool,
    /// Wallet the balance belongs to
    pub wallet_address: String,
}

/// Cached balance reader with optimistic debits
pub struct BalanceMonitor {
    client: Box<dyn ErcClient>,
    token: Address,
    wallet: Address,
    ttl: Duration,
    low_threshold_micros: u64,
    zero_threshold_micros: u64,
    cached: Mutex<Option<CachedBalance>>,
}

#[derive(Clone, Copy)]
struct CachedBalance {
    micros: u64,
    read_at: Instant,
}

impl BalanceMonitor {
    pub fn new(
        client: Box<dyn ErcClient>,
        token: Address,
        wallet: Address,
        ttl: Duration,
        low_threshold_micros: u64,
        zero_threshold_micros: u64,
    ) -> Self {
        Self {
            client,
            token,
            wallet,
            ttl,
            low_threshold_micros,
            zero_threshold_micros,
            cached: Mutex::new(None),
        }
    }

    /// Current balance, served from cache while fresh
    pub async fn check_balance(&self) -> Result<BalanceSnapshot, PaymentError> {
        let micros = self.current_micros().await?;
        Ok(self.snapshot(micros))
    }

    /// Whether the wallet covers an estimated cost
    pub async fn check_sufficient(&self, estimated_micros: u64) -> Result<bool, PaymentError> {
        Ok(self.current_micros().await? >= estimated_micros)
    }

    /// Optimistically subtract a successful payment from the cached balance
    pub fn deduct_estimated(&self, amount_micros: u64) {
        let mut cached = self.cached.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = cached.as_mut() {
            entry.micros = entry.micros.saturating_sub(amount_micros);
        }
    }

    /// Force the next read to hit the RPC (after a payment failure)
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *cached = None;
    }

    async fn current_micros(&self) -> Result<u64, PaymentError> {
        {
            let cached = self.cached.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(entry) = *cached
                && entry.read_at.elapsed() < self.ttl
            {
                return Ok(entry.micros);
            }
        }

        // Lock released across the RPC read
        let balance = self.client.balance_of(self.token, self.wallet).await?;
        let micros = u64::try_from(balance).unwrap_or(u64::MAX);

        let mut cached = self.cached.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *cached = Some(CachedBalance {
            micros,
            read_at: Instant::now(),
        });
        Ok(micros)
    }

    fn snapshot(&self, micros: u64) -> BalanceSnapshot {
        BalanceSnapshot {
            balance_micros: micros,
            balance_usd: micros as f64 / 1_000_000.0,
            is_low: micros < self.low_threshold_micros,
            is_empty: micros < self.zero_threshold_micros,
            wallet_address: format!("{:#x}", self.wallet),
        }
    }
}
