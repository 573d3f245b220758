use thiserror::Error;

/// Errors that can occur in the payment layer
#[derive(Debug, Error)]
pub enum PaymentError {
    /// 402 response without the `x-payment-required` header
    #[error("402 response is missing the x-payment-required header")]
    MissingPaymentHeader,

    /// Payment requirements carried no accepted options
    #[error("payment requirements carry no accepted options")]
    MissingAccepts,

    /// Accepted option carried neither `amount` nor `maxAmountRequired`
    #[error("payment option is missing an amount")]
    MissingAmount,

    /// Address field is not 40-hex (plain or CAIP-suffixed)
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    /// Malformed payment header or payload
    #[error("payment decode failed: {0}")]
    Decode(String),

    /// EIP-712 signing failed
    #[error("payment signing failed: {0}")]
    Signing(String),

    /// Balance RPC failed; distinct from an actually empty wallet
    #[error("balance rpc failed: {0}")]
    Rpc(String),

    /// Transport-level failure talking to the upstream
    #[error("upstream request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
