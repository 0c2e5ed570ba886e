//! Credit transaction data models.
//!
//! Every balance change in the ledger is recorded as a transaction carrying
//! the idempotency key that produced it, so replays can be answered with the
//! original record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of credit movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    Purchase,
    /// Debit for a generation
    Usage,
    Bonus,
    /// Credit returned after a dispatch that never ran
    Refund,
}

impl CreditTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Usage => "usage",
            Self::Bonus => "bonus",
            Self::Refund => "refund",
        }
    }

    /// Whether this type reduces the balance.
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::Usage)
    }
}

/// A ledger movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreditTransaction {
    pub id: String,

    pub owner_id: String,

    /// Credits moved (always positive; direction given by the type)
    pub amount: u32,

    pub transaction_type: CreditTransactionType,

    pub balance_before: u32,

    pub balance_after: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    pub idempotency_key: String,

    #[serde(default)]
    pub description: String,

    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn new(
        owner_id: impl Into<String>,
        transaction_type: CreditTransactionType,
        amount: u32,
        balance_before: u32,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let balance_after = if transaction_type.is_debit() {
            balance_before.saturating_sub(amount)
        } else {
            balance_before.saturating_add(amount)
        };
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            amount,
            transaction_type,
            balance_before,
            balance_after,
            task_id: None,
            service_id: None,
            idempotency_key: idempotency_key.into(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Set task ID if Some, otherwise no-op.
    pub fn with_optional_task_id(mut self, task_id: Option<String>) -> Self {
        if let Some(id) = task_id {
            self.task_id = Some(id);
        }
        self
    }

    /// Set service ID if Some, otherwise no-op.
    pub fn with_optional_service_id(mut self, service_id: Option<String>) -> Self {
        if let Some(id) = service_id {
            self.service_id = Some(id);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_after_follows_direction() {
        let debit = CreditTransaction::new("u", CreditTransactionType::Usage, 3, 10, "k1");
        assert_eq!(debit.balance_after, 7);

        let refund = CreditTransaction::new("u", CreditTransactionType::Refund, 3, 7, "k2")
            .with_task_id("t-1");
        assert_eq!(refund.balance_after, 10);
        assert_eq!(refund.task_id.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_serialization_skips_empty_options() {
        let tx = CreditTransaction::new("u", CreditTransactionType::Bonus, 5, 0, "k");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["transaction_type"], "bonus");
        assert!(json.get("task_id").is_none());
    }
}
