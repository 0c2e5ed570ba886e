//! Store and ledger metrics.

use metrics::counter;

// =============================================================================
// Metric Names
// =============================================================================

pub mod names {
    /// Optimistic task updates that had to be retried.
    pub const STORE_CONFLICTS_TOTAL: &str = "lvgen_store_conflicts_total";

    /// Ledger calls by operation and outcome.
    pub const LEDGER_CALLS_TOTAL: &str = "lvgen_ledger_calls_total";

    /// Credits debited, by transaction type.
    pub const LEDGER_CREDITS_MOVED_TOTAL: &str = "lvgen_ledger_credits_moved_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_conflict() {
    counter!(names::STORE_CONFLICTS_TOTAL).increment(1);
}

pub fn record_ledger_call(operation: &'static str, outcome: &'static str) {
    counter!(
        names::LEDGER_CALLS_TOTAL,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_credits_moved(transaction_type: &'static str, amount: u32) {
    counter!(
        names::LEDGER_CREDITS_MOVED_TOTAL,
        "type" => transaction_type
    )
    .increment(u64::from(amount));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::STORE_CONFLICTS_TOTAL.starts_with("lvgen_"));
        assert!(names::LEDGER_CALLS_TOTAL.contains("ledger"));
    }
}
