use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Payment and balance configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Hex private key of the payment wallet
    ///
    /// Usually supplied via `{{ env.BLOCKRUN_WALLET_KEY }}` rather than
    /// written into the file.
    #[serde(default)]
    pub wallet_key: Option<SecretString>,
    /// JSON-RPC endpoint for balance reads
    #[serde(default = "default_rpc_url")]
    pub rpc_url: Url,
    /// Payment network (CAIP `eip155:<chainId>`, or `base`/`base-sepolia`)
    #[serde(default = "default_network")]
    pub network: String,
    /// USDC contract address used for balance reads
    #[serde(default = "default_usdc_contract")]
    pub token_contract: String,
    /// TTL in seconds for cached payment parameters
    #[serde(default = "default_payment_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// TTL in seconds for cached balance reads
    #[serde(default = "default_balance_ttl")]
    pub balance_ttl_seconds: u64,
    /// Default authorization validity window in seconds when the server
    /// does not supply `maxTimeoutSeconds`
    #[serde(default = "default_max_timeout")]
    pub default_timeout_seconds: u64,
    /// Balance in micro-USD below which the wallet is considered low
    #[serde(default = "default_low_balance")]
    pub low_balance_micros: u64,
    /// Balance in micro-USD below which the wallet is considered empty
    #[serde(default = "default_zero_balance")]
    pub zero_balance_micros: u64,
    /// Skip the balance check entirely (testing and free-only setups)
    #[serde(default)]
    pub skip_balance_check: bool,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            wallet_key: None,
            rpc_url: default_rpc_url(),
            network: default_network(),
            token_contract: default_usdc_contract(),
            cache_ttl_seconds: default_payment_cache_ttl(),
            balance_ttl_seconds: default_balance_ttl(),
            default_timeout_seconds: default_max_timeout(),
            low_balance_micros: default_low_balance(),
            zero_balance_micros: default_zero_balance(),
            skip_balance_check: false,
        }
    }
}

fn default_rpc_url() -> Url {
    Url::parse("https://mainnet.base.org").expect("valid default URL")
}

fn default_network() -> String {
    "eip155:8453".to_owned()
}

/// Native USDC on Base
fn default_usdc_contract() -> String {
    "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_owned()
}

const fn default_payment_cache_ttl() -> u64 {
    60 * 60
}

const fn default_balance_ttl() -> u64 {
    30
}

const fn default_max_timeout() -> u64 {
    300
}

/// $1.00 in 6-decimal units
const fn default_low_balance() -> u64 {
    1_000_000
}

/// $0.0001 in 6-decimal units
const fn default_zero_balance() -> u64 {
    100
}
