use blockrun_payment::BalanceSnapshot;

/// Seam notified when a request is downgraded to the free model
///
/// The CLI collaborator hangs its banner and doctor hints off this; the
/// default just logs.
pub trait BalanceObserver: Send + Sync {
    fn on_low_balance(&self, snapshot: &BalanceSnapshot);
}

/// Default observer: structured log line, nothing else
pub struct LogBalanceObserver;

impl BalanceObserver for LogBalanceObserver {
    fn on_low_balance(&self, snapshot: &BalanceSnapshot) {
        tracing::warn!(
            wallet = %snapshot.wallet_address,
            balance_usd = snapshot.balance_usd,
            "balance low, serving the free model"
        );
    }
}
