//! EIP-712 transfer authorizations and the signer seam
//!
//! The proxy signs ERC-3009 `TransferWithAuthorization` typed data so the
//! upstream can settle the transfer without the payer submitting a
//! transaction. Signing sits behind [`PaymentSigner`] so the rest of the
//! payment layer stays crypto-agnostic.

use alloy::primitives::{Address, B256, U256};
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;

use crate::error::PaymentError;

sol! {
    /// ERC-3009 transfer authorization (EIP-712 primary type)
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Seam for EIP-712 typed-data signing
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Wallet address the signatures belong to
    fn address(&self) -> Address;

    /// Sign a transfer authorization under the given domain
    ///
    /// Returns the 65-byte signature as `0x`-prefixed hex.
    async fn sign_typed_data(
        &self,
        auth: &TransferWithAuthorization,
        domain: &Eip712Domain,
    ) -> Result<String, PaymentError>;
}

/// In-process wallet over a hex private key
pub struct LocalWallet {
    signer: PrivateKeySigner,
}

impl LocalWallet {
    /// Build from a hex private key, with or without the `0x` prefix
    pub fn from_hex_key(key: &str) -> Result<Self, PaymentError> {
        let key_hex = key.trim().strip_prefix("0x").unwrap_or_else(|| key.trim());
        let bytes = alloy::primitives::hex::decode(key_hex)
            .map_err(|_| PaymentError::Signing("wallet key is not valid hex".to_owned()))?;
        if bytes.len() != 32 {
            return Err(PaymentError::Signing("wallet key must be 32 bytes".to_owned()));
        }
        let signer = PrivateKeySigner::from_bytes(&B256::from_slice(&bytes))
            .map_err(|e| PaymentError::Signing(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Generate a throwaway wallet (tests)
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }
}

#[async_trait]
impl PaymentSigner for LocalWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(
        &self,
        auth: &TransferWithAuthorization,
        domain: &Eip712Domain,
    ) -> Result<String, PaymentError> {
        let hash = auth.eip712_signing_hash(domain);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| PaymentError::Signing(e.to_string()))?;
        Ok(format!("0x{}", alloy::primitives::hex::encode(signature.as_bytes())))
    }
}

/// Build the EIP-712 domain for a payment option
///
/// Defaults to the USDC domain (`"USD Coin"`, version `"2"`) when the
/// option carries no overrides.
pub fn build_domain(
    name: Option<&str>,
    version: Option<&str>,
    chain_id: u64,
    verifying_contract: Address,
) -> Eip712Domain {
    Eip712Domain::new(
        Some(name.unwrap_or("USD Coin").to_owned().into()),
        Some(version.unwrap_or("2").to_owned().into()),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// Parse a network identifier into a chain id
///
/// Understands CAIP `eip155:<chainId>` and the bare `base`/`base-sepolia`
/// names; anything else falls back to Base mainnet.
pub fn parse_chain_id(network: &str) -> u64 {
    if let Some(id) = network.strip_prefix("eip155:")
        && let Ok(parsed) = id.parse::<u64>()
    {
        return parsed;
    }
    match network {
        "base-sepolia" => 84532,
        _ => 8453,
    }
}

/// Parse an Ethereum address, plain or as the suffix of a CAIP identifier
pub fn parse_eth_address(field: &'static str, value: &str) -> Result<Address, PaymentError> {
    let candidate = value.rsplit(':').next().unwrap_or(value);
    candidate.parse::<Address>().map_err(|_| PaymentError::InvalidAddress {
        field,
        value: value.to_owned(),
    })
}
