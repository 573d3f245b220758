//! Usage recording seam
//!
//! One record per completed request. The in-memory recorder backs the
//! `/stats` endpoint; persistent log files live with the CLI
//! collaborator, behind the same trait.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use blockrun_core::Tier;
use serde::Serialize;

/// One completed request
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    #[serde(skip)]
    pub at: SystemTime,
    pub model: String,
    pub tier: Tier,
    pub profile: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cost_usd: f64,
    pub saved_usd: f64,
    pub cached: bool,
}

/// Aggregate over a trailing window
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub days: u32,
    pub requests: u64,
    pub cache_hits: u64,
    pub total_cost_usd: f64,
    pub total_saved_usd: f64,
    pub by_model: indexmap::IndexMap<String, u64>,
}

/// Seam for usage logging
pub trait UsageRecorder: Send + Sync {
    /// Record one completed request
    fn record(&self, record: UsageRecord);

    /// Aggregate the trailing `days` days
    fn aggregate(&self, days: u32) -> UsageSummary;
}

/// Process-local recorder backing `/stats`
#[derive(Default)]
pub struct InMemoryUsageLog {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageRecorder for InMemoryUsageLog {
    fn record(&self, record: UsageRecord) {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.push(record);
    }

    fn aggregate(&self, days: u32) -> UsageSummary {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 24 * 60 * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut summary = UsageSummary {
            days,
            requests: 0,
            cache_hits: 0,
            total_cost_usd: 0.0,
            total_saved_usd: 0.0,
            by_model: indexmap::IndexMap::new(),
        };

        for record in records.iter().filter(|r| r.at >= cutoff) {
            summary.requests += 1;
            if record.cached {
                summary.cache_hits += 1;
            }
            summary.total_cost_usd += record.cost_usd;
            summary.total_saved_usd += record.saved_usd;
            *summary.by_model.entry(record.model.clone()).or_insert(0) += 1;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model: &str, cost: f64) -> UsageRecord {
        UsageRecord {
            at: SystemTime::now(),
            model: model.to_owned(),
            tier: Tier::Simple,
            profile: "auto".to_owned(),
            input_tokens: 10,
            output_tokens: 20,
            cost_usd: cost,
            saved_usd: cost * 2.0,
            cached: false,
        }
    }

    #[test]
    fn aggregates_window() {
        let log = InMemoryUsageLog::default();
        log.record(record("a", 0.01));
        log.record(record("a", 0.02));
        log.record(record("b", 0.03));

        let summary = log.aggregate(7);
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.by_model["a"], 2);
        assert_eq!(summary.by_model["b"], 1);
        assert!((summary.total_cost_usd - 0.06).abs() < 1e-9);
    }

    #[test]
    fn old_records_fall_out_of_window() {
        let log = InMemoryUsageLog::default();
        let mut old = record("a", 0.01);
        old.at = SystemTime::UNIX_EPOCH;
        log.record(old);
        log.record(record("b", 0.02));

        let summary = log.aggregate(1);
        assert_eq!(summary.requests, 1);
        assert!(!summary.by_model.contains_key("a"));
    }
}
