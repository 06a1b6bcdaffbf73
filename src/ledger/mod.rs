/// Ledger Store
///
/// Owns accounts, chat sessions, chat messages and tool-usage records.
/// Callers only ever hold copies of entities; every mutation goes through
/// the store so a durable backend can replace the in-memory one.

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use models::*;
pub use sqlite::SqliteLedger;

use crate::{
    config::LedgerConfig,
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::sync::Arc;

/// Storage capability set used by the identity resolver, credit gate and
/// consultation orchestrator.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Accounts
    async fn create_account(&self, new: NewAccount) -> ApiResult<Account>;
    async fn get_account(&self, id: i64) -> ApiResult<Option<Account>>;
    async fn find_account_by_token(&self, token: &str) -> ApiResult<Option<Account>>;
    /// Oldest account matching the `(fingerprint, address)` pair
    async fn find_account_by_fingerprint(
        &self,
        fingerprint: &str,
        ip_address: &str,
    ) -> ApiResult<Option<Account>>;
    /// Refresh the activity marker
    async fn touch_account(&self, id: i64) -> ApiResult<()>;
    /// Subtract `amount` only if the balance covers it, as one atomic step
    async fn debit_credits(&self, id: i64, amount: Decimal) -> ApiResult<DebitOutcome>;
    /// Add `amount` (top-ups and refunds)
    async fn credit_account(&self, id: i64, amount: Decimal) -> ApiResult<Account>;
    /// Flip the free-trial flag false→true; returns whether this call flipped it
    async fn claim_free_trial(&self, id: i64) -> ApiResult<bool>;
    async fn mark_free_trial_used(&self, id: i64) -> ApiResult<()>;
    /// Flip the free-trial flag true→false; returns whether this call flipped it
    async fn release_free_trial(&self, id: i64) -> ApiResult<bool>;
    async fn set_payment_customer(&self, id: i64, customer_id: &str) -> ApiResult<Account>;

    // Chat sessions
    /// Return the session with this token, creating it owned by `account_id`
    /// if nobody has used the token yet
    async fn find_or_create_session(
        &self,
        token: &str,
        account_id: Option<i64>,
    ) -> ApiResult<ChatSession>;
    async fn get_session_by_token(&self, token: &str) -> ApiResult<Option<ChatSession>>;
    async fn list_account_sessions(&self, account_id: i64) -> ApiResult<Vec<ChatSession>>;

    // Chat messages
    async fn append_message(&self, message: NewChatMessage) -> ApiResult<ChatMessage>;
    /// Messages of a session in creation order
    async fn session_messages(&self, session_id: i64) -> ApiResult<Vec<ChatMessage>>;

    // Tool usage
    async fn record_tool_usage(&self, usage: NewToolUsage) -> ApiResult<ToolUsageRecord>;
    /// Newest first
    async fn account_tool_usage(&self, account_id: i64) -> ApiResult<Vec<ToolUsageRecord>>;

    /// Backend liveness check
    async fn ping(&self) -> ApiResult<()>;

    /// Human-readable backend name for health output
    fn backend(&self) -> &'static str;
}

/// Open the configured ledger backend
pub async fn open(config: &LedgerConfig) -> ApiResult<Arc<dyn LedgerStore>> {
    match config {
        LedgerConfig::Memory => {
            tracing::info!("Using in-memory ledger");
            Ok(Arc::new(MemoryLedger::new()))
        }
        LedgerConfig::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Using SQLite ledger");
            Ok(Arc::new(SqliteLedger::open(path).await?))
        }
    }
}

/// Largest single top-up or payment accepted at the API boundary
pub const MAX_CREDIT_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 2);

/// Check a caller-supplied monetary amount: positive, whole cents, bounded
pub fn validate_amount(amount: Decimal) -> ApiResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::Validation("Amount must be positive".to_string()));
    }
    if amount.round_dp(2) != amount {
        return Err(ApiError::Validation(
            "Amount must not have more than two decimal places".to_string(),
        ));
    }
    if amount > MAX_CREDIT_AMOUNT {
        return Err(ApiError::Validation(format!(
            "Amount must not exceed {}",
            format_credits(MAX_CREDIT_AMOUNT)
        )));
    }
    Ok(amount)
}

/// Convert a 2-decimal monetary amount into integer cents
pub fn to_cents(amount: Decimal) -> ApiResult<i64> {
    (amount.round_dp(2) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| ApiError::Validation(format!("Amount out of range: {}", amount)))
}

/// Convert integer cents back into a 2-decimal amount
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Canonical 2-decimal rendering used in API responses
pub fn format_credits(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cents_conversion() {
        assert_eq!(to_cents(Decimal::from_str("5.00").unwrap()).unwrap(), 500);
        assert_eq!(to_cents(Decimal::from_str("2").unwrap()).unwrap(), 200);
        assert_eq!(to_cents(Decimal::from_str("0.015").unwrap()).unwrap(), 2);
        assert_eq!(from_cents(1050), Decimal::from_str("10.50").unwrap());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::from_str("10.00").unwrap()).is_ok());
        assert!(validate_amount(Decimal::from_str("1000000.00").unwrap()).is_ok());
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(Decimal::from_str("-1").unwrap()).is_err());
        assert!(validate_amount(Decimal::from_str("0.001").unwrap()).is_err());
        assert!(validate_amount(Decimal::from_str("1000000.01").unwrap()).is_err());
        assert!(validate_amount(Decimal::MAX).is_err());
    }

    #[test]
    fn test_format_credits() {
        assert_eq!(format_credits(Decimal::ZERO), "0.00");
        assert_eq!(format_credits(Decimal::from_str("5").unwrap()), "5.00");
        assert_eq!(format_credits(Decimal::from_str("7.5").unwrap()), "7.50");
    }
}
