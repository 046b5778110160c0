use std::time::Duration;

use serde::Deserialize;

/// Tunables for [`crate::FinanceService`].
///
/// Every field has a default, so a partial `[ledger]` section is enough.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long an aggregation result is served from cache.
    pub aggregate_cache_ttl_secs: u64,
    pub aggregate_cache_max_entries: usize,
    /// How far past "now" an expense date may lie.
    pub future_date_tolerance_hours: i64,
    /// Reject budget upserts whose currency differs from recorded expenses,
    /// instead of only logging it.
    pub enforce_budget_currency_on_upsert: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            aggregate_cache_ttl_secs: 60,
            aggregate_cache_max_entries: 256,
            future_date_tolerance_hours: 24,
            enforce_budget_currency_on_upsert: false,
        }
    }
}

impl LedgerConfig {
    pub fn aggregate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_cache_ttl_secs)
    }

    pub fn future_date_tolerance(&self) -> chrono::Duration {
        chrono::Duration::hours(self.future_date_tolerance_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_input_keeps_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"aggregate_cache_ttl_secs": 5}"#).unwrap();
        assert_eq!(config.aggregate_cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.aggregate_cache_max_entries, 256);
        assert_eq!(config.future_date_tolerance(), chrono::Duration::hours(24));
        assert!(!config.enforce_budget_currency_on_upsert);
    }
}
