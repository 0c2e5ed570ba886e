//! Credit ledger client.
//!
//! The ledger is an external balance oracle. Every call carries an
//! idempotency key; replaying a key returns the transaction it first
//! produced and leaves the balance untouched, which is what makes debits
//! safe under ack-late redelivery.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lvgen_models::{CreditTransaction, CreditTransactionType};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{LedgerError, LedgerResult};
use crate::metrics;

/// A balance check followed by a debit, atomic from the caller's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitRequest {
    pub owner_id: String,
    pub amount: u32,
    pub idempotency_key: String,
    pub task_id: Option<String>,
    pub service_id: Option<String>,
    pub description: String,
}

impl DebitRequest {
    pub fn new(owner_id: impl Into<String>, amount: u32, idempotency_key: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            amount,
            idempotency_key: idempotency_key.into(),
            task_id: None,
            service_id: None,
            description: String::new(),
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Credits returned or granted to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRequest {
    pub owner_id: String,
    pub amount: u32,
    pub transaction_type: CreditTransactionType,
    pub idempotency_key: String,
    pub task_id: Option<String>,
    pub description: String,
}

impl CreditRequest {
    pub fn refund(owner_id: impl Into<String>, amount: u32, idempotency_key: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            amount,
            transaction_type: CreditTransactionType::Refund,
            idempotency_key: idempotency_key.into(),
            task_id: None,
            description: String::new(),
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, owner_id: &str) -> LedgerResult<u32>;

    /// Debit `amount` if the balance covers it, else
    /// [`LedgerError::InsufficientCredits`] with no mutation.
    async fn check_and_debit(&self, request: DebitRequest) -> LedgerResult<CreditTransaction>;

    async fn credit(&self, request: CreditRequest) -> LedgerResult<CreditTransaction>;
}

// =============================================================================
// HTTP ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl LedgerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// `None` when `LEDGER_BASE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("LEDGER_BASE_URL").ok()?;
        Some(Self {
            base_url,
            api_key: std::env::var("LEDGER_API_KEY").ok(),
            timeout: std::env::var("LEDGER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: u32,
}

#[derive(Debug, Default, Deserialize)]
struct InsufficientBody {
    #[serde(default)]
    needed: u32,
    #[serde(default)]
    available: u32,
}

#[derive(Debug, Serialize)]
struct DebitBody<'a> {
    amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_id: Option<&'a str>,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct CreditBody<'a> {
    amount: u32,
    transaction_type: CreditTransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    description: &'a str,
}

/// REST client for the external ledger service.
///
/// Routes (relative to the base URL):
/// - `GET  v1/accounts/{owner}/balance`
/// - `POST v1/accounts/{owner}/debits`  (402 when the balance is short)
/// - `POST v1/accounts/{owner}/credits`
pub struct HttpCreditLedger {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpCreditLedger {
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| LedgerError::config(format!("invalid ledger URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::config("ledger URL cannot be a base"));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
        })
    }

    fn account_url(&self, owner_id: &str, action: &str) -> LedgerResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::config("ledger URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v1", "accounts", owner_id, action]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn read_transaction(
        &self,
        operation: &'static str,
        owner_id: &str,
        response: reqwest::Response,
    ) -> LedgerResult<CreditTransaction> {
        let status = response.status();
        if status.is_success() {
            metrics::record_ledger_call(operation, "ok");
            return Ok(response.json::<CreditTransaction>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let err = match status {
            StatusCode::PAYMENT_REQUIRED => {
                let details: InsufficientBody = serde_json::from_str(&body).unwrap_or_default();
                LedgerError::insufficient(details.needed, details.available)
            }
            StatusCode::NOT_FOUND => LedgerError::AccountNotFound(owner_id.to_string()),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                LedgerError::unavailable(format!("{s}: {body}"))
            }
            s => LedgerError::rejected(format!("{s}: {body}")),
        };
        metrics::record_ledger_call(operation, if err.is_insufficient() { "insufficient" } else { "error" });
        Err(err)
    }
}

#[async_trait]
impl CreditLedger for HttpCreditLedger {
    async fn balance(&self, owner_id: &str) -> LedgerResult<u32> {
        let url = self.account_url(owner_id, "balance")?;
        let response = self.authorize(self.http.get(url)).send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => Ok(response.json::<BalanceResponse>().await?.balance),
            StatusCode::NOT_FOUND => Err(LedgerError::AccountNotFound(owner_id.to_string())),
            s if s.is_server_error() => Err(LedgerError::unavailable(s.to_string())),
            s => Err(LedgerError::rejected(s.to_string())),
        }
    }

    async fn check_and_debit(&self, request: DebitRequest) -> LedgerResult<CreditTransaction> {
        let url = self.account_url(&request.owner_id, "debits")?;
        let body = DebitBody {
            amount: request.amount,
            task_id: request.task_id.as_deref(),
            service_id: request.service_id.as_deref(),
            description: &request.description,
        };

        let response = self
            .authorize(self.http.post(url))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await?;

        let tx = self
            .read_transaction("debit", &request.owner_id, response)
            .await?;
        metrics::record_credits_moved(CreditTransactionType::Usage.as_str(), tx.amount);
        info!(
            owner_id = %request.owner_id,
            amount = request.amount,
            balance_after = tx.balance_after,
            key = %request.idempotency_key,
            "Debited credits"
        );
        Ok(tx)
    }

    async fn credit(&self, request: CreditRequest) -> LedgerResult<CreditTransaction> {
        let url = self.account_url(&request.owner_id, "credits")?;
        let body = CreditBody {
            amount: request.amount,
            transaction_type: request.transaction_type,
            task_id: request.task_id.as_deref(),
            description: &request.description,
        };

        let response = self
            .authorize(self.http.post(url))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await?;

        let tx = self
            .read_transaction("credit", &request.owner_id, response)
            .await?;
        metrics::record_credits_moved(request.transaction_type.as_str(), tx.amount);
        info!(
            owner_id = %request.owner_id,
            amount = request.amount,
            kind = request.transaction_type.as_str(),
            key = %request.idempotency_key,
            "Credited credits"
        );
        Ok(tx)
    }
}

// =============================================================================
// In-memory ledger
// =============================================================================

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, u32>,
    by_key: HashMap<String, CreditTransaction>,
    log: Vec<CreditTransaction>,
}

/// Process-local ledger with the same idempotency guarantees.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account balance.
    pub fn with_balance(self, owner_id: impl Into<String>, balance: u32) -> Self {
        self.set_balance(owner_id, balance);
        self
    }

    pub fn set_balance(&self, owner_id: impl Into<String>, balance: u32) {
        self.lock().balances.insert(owner_id.into(), balance);
    }

    /// All recorded transactions in order.
    pub fn transactions(&self) -> Vec<CreditTransaction> {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut LedgerState, tx: CreditTransaction) -> CreditTransaction {
        state.balances.insert(tx.owner_id.clone(), tx.balance_after);
        state.by_key.insert(tx.idempotency_key.clone(), tx.clone());
        state.log.push(tx.clone());
        tx
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn balance(&self, owner_id: &str) -> LedgerResult<u32> {
        Ok(self.lock().balances.get(owner_id).copied().unwrap_or(0))
    }

    async fn check_and_debit(&self, request: DebitRequest) -> LedgerResult<CreditTransaction> {
        let mut state = self.lock();
        if let Some(existing) = state.by_key.get(&request.idempotency_key) {
            debug!(key = %request.idempotency_key, "Replayed debit");
            return Ok(existing.clone());
        }

        let available = state.balances.get(&request.owner_id).copied().unwrap_or(0);
        if available < request.amount {
            warn!(
                owner_id = %request.owner_id,
                needed = request.amount,
                available,
                "Insufficient credits"
            );
            return Err(LedgerError::insufficient(request.amount, available));
        }

        let tx = CreditTransaction::new(
            &request.owner_id,
            CreditTransactionType::Usage,
            request.amount,
            available,
            &request.idempotency_key,
        )
        .with_optional_task_id(request.task_id)
        .with_optional_service_id(request.service_id)
        .with_description(request.description);

        Ok(Self::record(&mut state, tx))
    }

    async fn credit(&self, request: CreditRequest) -> LedgerResult<CreditTransaction> {
        if request.transaction_type.is_debit() {
            return Err(LedgerError::rejected("credit request with a debit type"));
        }

        let mut state = self.lock();
        if let Some(existing) = state.by_key.get(&request.idempotency_key) {
            debug!(key = %request.idempotency_key, "Replayed credit");
            return Ok(existing.clone());
        }

        let before = state.balances.get(&request.owner_id).copied().unwrap_or(0);
        let tx = CreditTransaction::new(
            &request.owner_id,
            request.transaction_type,
            request.amount,
            before,
            &request.idempotency_key,
        )
        .with_optional_task_id(request.task_id)
        .with_description(request.description);

        Ok(Self::record(&mut state, tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_in_memory_debit_and_replay() {
        let ledger = InMemoryLedger::new().with_balance("u1", 10);

        let tx = ledger
            .check_and_debit(DebitRequest::new("u1", 4, "task:t1:dispatch").for_task("t1", "svc"))
            .await
            .unwrap();
        assert_eq!(tx.balance_before, 10);
        assert_eq!(tx.balance_after, 6);
        assert_eq!(tx.task_id.as_deref(), Some("t1"));

        let replay = ledger
            .check_and_debit(DebitRequest::new("u1", 4, "task:t1:dispatch"))
            .await
            .unwrap();
        assert_eq!(replay.id, tx.id);
        assert_eq!(ledger.balance("u1").await.unwrap(), 6);
        assert_eq!(ledger.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_insufficient_leaves_balance() {
        let ledger = InMemoryLedger::new().with_balance("u1", 2);
        let err = ledger
            .check_and_debit(DebitRequest::new("u1", 5, "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                needed: 5,
                available: 2
            }
        ));
        assert_eq!(ledger.balance("u1").await.unwrap(), 2);
        assert!(ledger.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_refund() {
        let ledger = InMemoryLedger::new().with_balance("u1", 5);
        ledger
            .check_and_debit(DebitRequest::new("u1", 5, "task:t:dispatch"))
            .await
            .unwrap();
        let refund = ledger
            .credit(CreditRequest::refund("u1", 5, "task:t:refund").for_task("t"))
            .await
            .unwrap();
        assert_eq!(refund.transaction_type, CreditTransactionType::Refund);
        assert_eq!(refund.balance_after, 5);

        ledger
            .credit(CreditRequest::refund("u1", 5, "task:t:refund"))
            .await
            .unwrap();
        assert_eq!(ledger.balance("u1").await.unwrap(), 5);
    }

    fn sample_tx(amount: u32) -> serde_json::Value {
        serde_json::to_value(
            CreditTransaction::new("u1", CreditTransactionType::Usage, amount, 10, "k1")
                .with_task_id("t1"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_debit_sends_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/u1/debits"))
            .and(header("Idempotency-Key", "task:t1:dispatch"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"amount": 3, "task_id": "t1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(sample_tx(3)))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = LedgerConfig::new(server.uri());
        config.api_key = Some("secret".into());
        let ledger = HttpCreditLedger::new(config).unwrap();

        let tx = ledger
            .check_and_debit(DebitRequest::new("u1", 3, "task:t1:dispatch").for_task("t1", "svc"))
            .await
            .unwrap();
        assert_eq!(tx.amount, 3);
        assert_eq!(tx.balance_after, 7);
    }

    #[tokio::test]
    async fn test_http_payment_required_maps_to_insufficient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/u1/debits"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(serde_json::json!({"needed": 8, "available": 1})),
            )
            .mount(&server)
            .await;

        let ledger = HttpCreditLedger::new(LedgerConfig::new(server.uri())).unwrap();
        let err = ledger
            .check_and_debit(DebitRequest::new("u1", 8, "k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                needed: 8,
                available: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_http_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/u1/credits"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let ledger = HttpCreditLedger::new(LedgerConfig::new(server.uri())).unwrap();
        let err = ledger
            .credit(CreditRequest::refund("u1", 1, "k"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/user-9/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"balance": 42})))
            .mount(&server)
            .await;

        let ledger = HttpCreditLedger::new(LedgerConfig::new(server.uri())).unwrap();
        assert_eq!(ledger.balance("user-9").await.unwrap(), 42);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpCreditLedger::new(LedgerConfig::new("not a url")),
            Err(LedgerError::Config(_))
        ));
    }
}
