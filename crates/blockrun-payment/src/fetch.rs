//! Payment-bearing HTTP fetch
//!
//! Wraps `reqwest` so callers never see a 402: the normal path performs
//! the handshake (decode requirements, sign, retry once), and the
//! pre-auth fast path signs against cached parameters on the very first
//! request. Exactly one signature is produced per retry, attached under
//! both the `payment-signature` and `x-payment` header names with
//! identical bytes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{B256, U256};
use http::{HeaderMap, Method, StatusCode};
use rand::RngCore;
use url::Url;

use crate::cache::{PaymentCache, PaymentParams};
use crate::eip712::{PaymentSigner, TransferWithAuthorization, build_domain, parse_chain_id, parse_eth_address};
use crate::error::PaymentError;
use crate::protocol::{
    AuthorizationFields, PaymentOption, SignedPayload, SignedPayment, SignedResource, decode_payment_required,
    encode_signed_payment,
};

/// Header the upstream uses to announce payment requirements
pub const PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";

/// Header names the signed envelope is attached under (identical content)
pub const PAYMENT_HEADERS: [&str; 2] = ["payment-signature", "x-payment"];

/// Buffered upstream response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// HTTP client that satisfies x402 servers
pub struct PaymentFetch {
    client: reqwest::Client,
    signer: Arc<dyn PaymentSigner>,
    cache: Arc<PaymentCache>,
    default_timeout_seconds: u64,
}

impl PaymentFetch {
    pub fn new(
        client: reqwest::Client,
        signer: Arc<dyn PaymentSigner>,
        cache: Arc<PaymentCache>,
        default_timeout_seconds: u64,
    ) -> Self {
        Self {
            client,
            signer,
            cache,
            default_timeout_seconds,
        }
    }

    /// Wallet address payments are signed from
    pub fn wallet_address(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    /// Shared access to the payment-parameter cache
    pub fn cache(&self) -> &PaymentCache {
        &self.cache
    }

    /// Issue a request, handling any 402 along the way
    ///
    /// `estimated_micros` enables the pre-auth fast path when parameters
    /// for the endpoint are cached: the first request already carries a
    /// signed payment over the estimate.
    pub async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        estimated_micros: Option<u64>,
    ) -> Result<FetchResponse, PaymentError> {
        let path = url.path().to_owned();

        // Pre-auth fast path: sign against cached parameters up front
        if let Some(estimate) = estimated_micros
            && let Some(params) = self.cache.get(&path)
        {
            let header = self.build_payment(&params, &estimate.to_string(), url).await?;
            let response = self.send(method.clone(), url, body, Some(&header)).await?;

            if response.status != StatusCode::PAYMENT_REQUIRED {
                return Ok(response);
            }

            tracing::debug!(%url, "pre-authorized payment was rejected");
            return match payment_required_header(&response.headers) {
                // Fresh requirements came back: run the normal handshake
                Some(required) => self.handshake(&required, method, url, body, &path).await,
                // No requirements: parameters are stale, start clean
                None => {
                    self.cache.invalidate(&path);
                    let clean = self.send(method.clone(), url, body, None).await?;
                    self.settle_if_required(clean, method, url, body, &path).await
                }
            };
        }

        let response = self.send(method.clone(), url, body, None).await?;
        self.settle_if_required(response, method, url, body, &path).await
    }

    /// Complete a 402 response by paying; pass anything else through
    async fn settle_if_required(
        &self,
        response: FetchResponse,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        path: &str,
    ) -> Result<FetchResponse, PaymentError> {
        if response.status != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }
        let required = payment_required_header(&response.headers).ok_or(PaymentError::MissingPaymentHeader)?;
        self.handshake(&required, method, url, body, path).await
    }

    /// The 402 handshake: decode requirements, cache, sign, retry once
    async fn handshake(
        &self,
        required_header: &str,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        path: &str,
    ) -> Result<FetchResponse, PaymentError> {
        let required = decode_payment_required(required_header)?;
        let option = required.accepts.first().ok_or(PaymentError::MissingAccepts)?;
        let amount = option.required_amount()?.to_owned();

        let params = PaymentParams::from_option(option, required.resource.as_ref());
        self.cache.set(path, params.clone());

        let header = self.build_payment(&params, &amount, url).await?;
        tracing::debug!(%url, amount, network = %params.network, "retrying with signed payment");

        self.send(method, url, body, Some(&header)).await
    }

    /// Sign one payment envelope for the given parameters and amount
    async fn build_payment(&self, params: &PaymentParams, amount: &str, url: &Url) -> Result<String, PaymentError> {
        let to = parse_eth_address("payTo", &params.pay_to)?;
        let asset = parse_eth_address("asset", &params.asset)?;
        let value = U256::from_str_radix(amount, 10)
            .map_err(|_| PaymentError::Decode(format!("amount is not a decimal integer: {amount}")))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let valid_after = now.saturating_sub(600);
        let valid_before = now + params.max_timeout_seconds.unwrap_or(self.default_timeout_seconds);

        let mut nonce = [0u8; 32];
        rand::rng().fill_bytes(&mut nonce);
        let nonce = B256::from(nonce);

        let auth = TransferWithAuthorization {
            from: self.signer.address(),
            to,
            value,
            validAfter: U256::from(valid_after),
            validBefore: U256::from(valid_before),
            nonce,
        };

        let domain = build_domain(
            params.extra_name.as_deref(),
            params.extra_version.as_deref(),
            parse_chain_id(&params.network),
            asset,
        );

        let signature = self.signer.sign_typed_data(&auth, &domain).await?;

        let envelope = SignedPayment {
            x402_version: 2,
            resource: SignedResource {
                url: params.resource_url.clone().unwrap_or_else(|| url.to_string()),
                description: params.resource_description.clone().unwrap_or_default(),
                mime_type: "application/json".to_owned(),
            },
            accepted: PaymentOption {
                scheme: params.scheme.clone(),
                network: params.network.clone(),
                asset: params.asset.clone(),
                pay_to: params.pay_to.clone(),
                amount: Some(amount.to_owned()),
                max_amount_required: None,
                max_timeout_seconds: params.max_timeout_seconds,
                extra: None,
            },
            payload: SignedPayload {
                signature,
                authorization: AuthorizationFields {
                    from: format!("{:#x}", self.signer.address()),
                    to: format!("{to:#x}"),
                    value: amount.to_owned(),
                    valid_after: valid_after.to_string(),
                    valid_before: valid_before.to_string(),
                    nonce: format!("{nonce:#x}"),
                },
            },
            extensions: serde_json::Map::new(),
        };

        Ok(encode_signed_payment(&envelope))
    }

    /// Send one request, optionally with the signed payment attached
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        payment: Option<&str>,
    ) -> Result<FetchResponse, PaymentError> {
        let mut builder = self.client.request(method, url.clone());

        if let Some(bytes) = body {
            builder = builder
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }

        if let Some(header) = payment {
            for name in PAYMENT_HEADERS {
                builder = builder.header(name, header);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse { status, headers, body })
    }
}

fn payment_required_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
