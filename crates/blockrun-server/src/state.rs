//! Shared proxy state
//!
//! One `Arc`'d bundle of every subsystem, built from configuration. Each
//! component owns its maps; handlers reach them only through the
//! component APIs.

use std::sync::Arc;
use std::time::Duration;

use blockrun_cache::{RequestDeduplicator, ResponseCache, SessionStore};
use blockrun_config::Config;
use blockrun_core::ModelRegistry;
use blockrun_payment::{
    BalanceMonitor, JsonRpcClient, LocalWallet, PaymentCache, PaymentFetch, PaymentSigner, parse_eth_address,
};
use blockrun_routing::{CooldownTracker, KeywordSets};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use crate::degraded::DegradedDetector;
use crate::observer::{BalanceObserver, LogBalanceObserver};
use crate::usage::{InMemoryUsageLog, UsageRecorder};

/// Cloneable handle to the proxy's shared state
#[derive(Clone)]
pub struct ProxyState {
    pub(crate) inner: Arc<ProxyInner>,
}

pub(crate) struct ProxyInner {
    pub config: Config,
    pub registry: ModelRegistry,
    pub keywords: KeywordSets,
    pub fetch: PaymentFetch,
    pub balance: BalanceMonitor,
    pub dedup: RequestDeduplicator,
    pub response_cache: ResponseCache,
    pub sessions: Arc<SessionStore>,
    pub cooldowns: CooldownTracker,
    pub detector: DegradedDetector,
    pub usage: Box<dyn UsageRecorder>,
    pub observer: Box<dyn BalanceObserver>,
}

impl ProxyState {
    /// Build every subsystem from configuration
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed wallet key, token contract
    /// address, or degraded-detection pattern
    pub fn from_config(config: Config, shutdown: &CancellationToken) -> anyhow::Result<Self> {
        let wallet = match &config.payment.wallet_key {
            Some(key) => LocalWallet::from_hex_key(key.expose_secret())
                .map_err(|e| anyhow::anyhow!("invalid payment.wallet_key: {e}"))?,
            None => {
                tracing::warn!("no wallet key configured, using an ephemeral wallet");
                LocalWallet::random()
            }
        };
        let wallet = Arc::new(wallet);
        let wallet_address = wallet.as_ref().address();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.read_timeout_seconds))
            .build()?;

        let payment_cache = Arc::new(PaymentCache::new(Duration::from_secs(config.payment.cache_ttl_seconds)));
        let fetch = PaymentFetch::new(
            client.clone(),
            wallet,
            payment_cache,
            config.payment.default_timeout_seconds,
        );

        let token = parse_eth_address("token_contract", &config.payment.token_contract)
            .map_err(|e| anyhow::anyhow!("invalid payment.token_contract: {e}"))?;
        let balance = BalanceMonitor::new(
            Box::new(JsonRpcClient::new(client, config.payment.rpc_url.clone())),
            token,
            wallet_address,
            Duration::from_secs(config.payment.balance_ttl_seconds),
            config.payment.low_balance_micros,
            config.payment.zero_balance_micros,
        );

        let dedup = RequestDeduplicator::new(
            Duration::from_secs(config.dedup.completed_ttl_seconds),
            config.dedup.max_body_bytes,
        );
        let response_cache = ResponseCache::new(config.cache.clone());

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(config.session.timeout_seconds)));
        if config.session.enabled {
            SessionStore::spawn_sweeper(
                &sessions,
                Duration::from_secs(config.session.sweep_interval_seconds),
                shutdown.clone(),
            );
        }

        let cooldowns = CooldownTracker::new(Duration::from_secs(config.routing.cooldown_seconds));
        let detector = DegradedDetector::new(config.degraded.clone())?;

        let mut keywords = KeywordSets::default();
        keywords.apply_overrides(&config.routing.keywords);

        Ok(Self {
            inner: Arc::new(ProxyInner {
                registry: ModelRegistry::builtin(),
                keywords,
                fetch,
                balance,
                dedup,
                response_cache,
                sessions,
                cooldowns,
                detector,
                usage: Box::new(InMemoryUsageLog::default()),
                observer: Box::new(LogBalanceObserver),
                config,
            }),
        })
    }

    /// Wallet address payments are signed from
    pub fn wallet_address(&self) -> String {
        self.inner.fetch.wallet_address()
    }
}
