use std::path::PathBuf;

use clap::Parser;

/// blockrun smart routing proxy
#[derive(Debug, Parser)]
#[command(name = "blockrun", about = "Local LLM routing proxy with x402 micropayments")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "blockrun.toml", env = "BLOCKRUN_CONFIG")]
    pub config: PathBuf,

    /// Override the listen port
    #[arg(short, long, env = "BLOCKRUN_PORT")]
    pub port: Option<u16>,

    /// Override the upstream aggregator URL
    #[arg(long, env = "BLOCKRUN_UPSTREAM")]
    pub upstream: Option<url::Url>,

    /// Wallet private key (prefer the environment over the flag)
    #[arg(long, env = "BLOCKRUN_WALLET_KEY", hide_env_values = true)]
    pub wallet_key: Option<String>,

    /// Log filter (tracing syntax)
    #[arg(long, default_value = "info", env = "BLOCKRUN_LOG")]
    pub log: String,
}
