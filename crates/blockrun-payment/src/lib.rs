//! x402 payment plumbing for the blockrun proxy
//!
//! Implements the HTTP 402 payment-required handshake: parsing the
//! server's payment requirements, signing EIP-712 transfer
//! authorizations, caching accepted payment parameters per endpoint for
//! pre-authorized single-round-trip requests, and reading the wallet's
//! on-chain balance. The cryptographic primitives sit behind the
//! [`PaymentSigner`] and [`ErcClient`] seams so everything above them is
//! crypto-agnostic.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod balance;
pub mod cache;
pub mod eip712;
mod error;
pub mod fetch;
pub mod protocol;
pub mod transform;

pub use balance::{BalanceMonitor, BalanceSnapshot, ErcClient, JsonRpcClient};
pub use cache::{PaymentCache, PaymentParams};
pub use eip712::{LocalWallet, PaymentSigner, TransferWithAuthorization, parse_chain_id, parse_eth_address};
pub use error::PaymentError;
pub use fetch::{FetchResponse, PaymentFetch};
pub use protocol::{PaymentOption, PaymentRequired, SignedPayment};
pub use transform::{PaymentFailure, transform_payment_error};
