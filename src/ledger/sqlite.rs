/// SQLite ledger backend
///
/// Balances live in `credits_cents` so the debit can be a single conditional
/// UPDATE; SQLite serializes writers, which makes check-and-subtract atomic
/// without an explicit transaction.
use crate::{
    error::{ApiError, ApiResult},
    ledger::{
        from_cents, to_cents, Account, ChatMessage, ChatSession, DebitOutcome, LedgerStore,
        NewAccount, NewChatMessage, NewToolUsage, ToolName, ToolUsageRecord,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow},
    Row,
};
use std::path::Path;

const ACCOUNT_COLUMNS: &str = "id, session_token, ip_address, fingerprint, credits_cents, \
     has_used_free_trial, payment_customer_id, created_at, last_seen_at";

/// Ledger persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteLedger {
    db: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `path` and run migrations
    pub async fn open(path: &Path) -> ApiResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;

        Ok(Self { db })
    }

    fn account_from_row(row: &SqliteRow) -> ApiResult<Account> {
        Ok(Account {
            id: row.try_get("id")?,
            session_token: row.try_get("session_token")?,
            ip_address: row.try_get("ip_address")?,
            fingerprint: row.try_get("fingerprint")?,
            credits: from_cents(row.try_get("credits_cents")?),
            has_used_free_trial: row.try_get("has_used_free_trial")?,
            payment_customer_id: row.try_get("payment_customer_id")?,
            created_at: row.try_get("created_at")?,
            last_seen_at: row.try_get("last_seen_at")?,
        })
    }

    fn session_from_row(row: &SqliteRow) -> ApiResult<ChatSession> {
        Ok(ChatSession {
            id: row.try_get("id")?,
            token: row.try_get("token")?,
            account_id: row.try_get("account_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn message_from_row(row: &SqliteRow) -> ApiResult<ChatMessage> {
        let role: String = row.try_get("role")?;
        let cost: Option<i64> = row.try_get("cost_cents")?;
        Ok(ChatMessage {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            account_id: row.try_get("account_id")?,
            role: role.parse()?,
            content: row.try_get("content")?,
            metadata: decode_json(row.try_get("metadata")?)?,
            cost: cost.map(from_cents),
            created_at: row.try_get("created_at")?,
        })
    }

    fn tool_usage_from_row(row: &SqliteRow) -> ApiResult<ToolUsageRecord> {
        let tool_name: String = row.try_get("tool_name")?;
        let tool_name: ToolName = tool_name
            .parse()
            .map_err(|_| ApiError::Internal(format!("Unknown tool in ledger: {}", tool_name)))?;
        Ok(ToolUsageRecord {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            tool_name,
            input: row.try_get("input")?,
            result: decode_json(row.try_get("result")?)?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn require_account(&self, id: i64) -> ApiResult<Account> {
        self.get_account(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Account {} not found", id)))
    }
}

fn encode_json(value: &Option<serde_json::Value>) -> ApiResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::Internal(format!("Failed to encode JSON column: {}", e)))
}

fn decode_json(raw: Option<String>) -> ApiResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("Corrupt JSON column: {}", e)))
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn create_account(&self, new: NewAccount) -> ApiResult<Account> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO account (session_token, ip_address, fingerprint, credits_cents, has_used_free_trial, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, 0, FALSE, ?4, ?4)",
        )
        .bind(&new.session_token)
        .bind(&new.ip_address)
        .bind(&new.fingerprint)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ApiError::Conflict("Session token already in use".to_string())
            }
            other => ApiError::Database(other),
        })?;

        Ok(Account {
            id: result.last_insert_rowid(),
            session_token: new.session_token,
            ip_address: new.ip_address,
            fingerprint: new.fingerprint,
            credits: Decimal::new(0, 2),
            has_used_free_trial: false,
            payment_customer_id: None,
            created_at: now,
            last_seen_at: now,
        })
    }

    async fn get_account(&self, id: i64) -> ApiResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM account WHERE id = ?1", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn find_account_by_token(&self, token: &str) -> ApiResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE session_token = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn find_account_by_fingerprint(
        &self,
        fingerprint: &str,
        ip_address: &str,
    ) -> ApiResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE fingerprint = ?1 AND ip_address = ?2 ORDER BY id LIMIT 1",
            ACCOUNT_COLUMNS
        ))
        .bind(fingerprint)
        .bind(ip_address)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn touch_account(&self, id: i64) -> ApiResult<()> {
        let result = sqlx::query("UPDATE account SET last_seen_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }

    async fn debit_credits(&self, id: i64, amount: Decimal) -> ApiResult<DebitOutcome> {
        let cents = to_cents(amount)?;

        let row = sqlx::query(
            "UPDATE account SET credits_cents = credits_cents - ?1
             WHERE id = ?2 AND credits_cents >= ?1
             RETURNING credits_cents",
        )
        .bind(cents)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(DebitOutcome::Debited {
                balance: from_cents(row.try_get("credits_cents")?),
            }),
            None => {
                let account = self.require_account(id).await?;
                Ok(DebitOutcome::Insufficient {
                    balance: account.credits,
                })
            }
        }
    }

    async fn credit_account(&self, id: i64, amount: Decimal) -> ApiResult<Account> {
        let result = sqlx::query("UPDATE account SET credits_cents = credits_cents + ?1 WHERE id = ?2")
            .bind(to_cents(amount)?)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Account {} not found", id)));
        }
        self.require_account(id).await
    }

    async fn claim_free_trial(&self, id: i64) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET has_used_free_trial = TRUE WHERE id = ?1 AND has_used_free_trial = FALSE",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        // Distinguish "already claimed" from "no such account"
        self.require_account(id).await?;
        Ok(false)
    }

    async fn mark_free_trial_used(&self, id: i64) -> ApiResult<()> {
        let result = sqlx::query("UPDATE account SET has_used_free_trial = TRUE WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }

    async fn release_free_trial(&self, id: i64) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET has_used_free_trial = FALSE WHERE id = ?1 AND has_used_free_trial = TRUE",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.require_account(id).await?;
        Ok(false)
    }

    async fn set_payment_customer(&self, id: i64, customer_id: &str) -> ApiResult<Account> {
        sqlx::query("UPDATE account SET payment_customer_id = ?1 WHERE id = ?2")
            .bind(customer_id)
            .bind(id)
            .execute(&self.db)
            .await?;

        self.require_account(id).await
    }

    async fn find_or_create_session(
        &self,
        token: &str,
        account_id: Option<i64>,
    ) -> ApiResult<ChatSession> {
        sqlx::query(
            "INSERT INTO chat_session (token, account_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO NOTHING",
        )
        .bind(token)
        .bind(account_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.get_session_by_token(token)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Session {} vanished after insert", token)))
    }

    async fn get_session_by_token(&self, token: &str) -> ApiResult<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT id, token, account_id, created_at FROM chat_session WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn list_account_sessions(&self, account_id: i64) -> ApiResult<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT id, token, account_id, created_at FROM chat_session
             WHERE account_id = ?1 ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::session_from_row).collect()
    }

    async fn append_message(&self, message: NewChatMessage) -> ApiResult<ChatMessage> {
        let now = Utc::now();
        let cost_cents = message.cost.map(to_cents).transpose()?;
        let metadata = encode_json(&message.metadata)?;

        let result = sqlx::query(
            "INSERT INTO chat_message (session_id, account_id, role, content, metadata, cost_cents, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(message.session_id)
        .bind(message.account_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata)
        .bind(cost_cents)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => ApiError::NotFound(
                format!("Session {} not found", message.session_id),
            ),
            other => ApiError::Database(other),
        })?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            session_id: message.session_id,
            account_id: message.account_id,
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            cost: message.cost,
            created_at: now,
        })
    }

    async fn session_messages(&self, session_id: i64) -> ApiResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, session_id, account_id, role, content, metadata, cost_cents, created_at
             FROM chat_message WHERE session_id = ?1 ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn record_tool_usage(&self, usage: NewToolUsage) -> ApiResult<ToolUsageRecord> {
        let now = Utc::now();
        let result_json = encode_json(&usage.result)?;

        let result = sqlx::query(
            "INSERT INTO tool_usage (account_id, tool_name, input, result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(usage.account_id)
        .bind(usage.tool_name.as_str())
        .bind(&usage.input)
        .bind(&result_json)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(ToolUsageRecord {
            id: result.last_insert_rowid(),
            account_id: usage.account_id,
            tool_name: usage.tool_name,
            input: usage.input,
            result: usage.result,
            created_at: now,
        })
    }

    async fn account_tool_usage(&self, account_id: i64) -> ApiResult<Vec<ToolUsageRecord>> {
        let rows = sqlx::query(
            "SELECT id, account_id, tool_name, input, result, created_at
             FROM tool_usage WHERE account_id = ?1 ORDER BY id DESC",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::tool_usage_from_row).collect()
    }

    async fn ping(&self) -> ApiResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MessageRole;
    use std::str::FromStr;
    use std::sync::Arc;

    async fn create_test_ledger() -> (SqliteLedger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SqliteLedger::open(&dir.path().join("ledger.sqlite")).await.unwrap();
        (ledger, dir)
    }

    fn new_account(token: &str) -> NewAccount {
        NewAccount {
            session_token: token.to_string(),
            ip_address: "203.0.113.7".to_string(),
            fingerprint: Some("fp-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_account() {
        let (ledger, _dir) = create_test_ledger().await;

        let account = ledger.create_account(new_account("tok-a")).await.unwrap();
        assert_eq!(account.credits, Decimal::ZERO);

        let by_token = ledger.find_account_by_token("tok-a").await.unwrap().unwrap();
        assert_eq!(by_token.id, account.id);
        assert!(!by_token.has_used_free_trial);

        let by_fp = ledger
            .find_account_by_fingerprint("fp-1", "203.0.113.7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_fp.id, account.id);

        assert!(matches!(
            ledger.create_account(new_account("tok-a")).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account(new_account("tok-a")).await.unwrap();

        let topped = ledger
            .credit_account(account.id, Decimal::from_str("10.00").unwrap())
            .await
            .unwrap();
        assert_eq!(topped.credits, Decimal::from_str("10.00").unwrap());

        let price = Decimal::from_str("5.00").unwrap();
        assert_eq!(
            ledger.debit_credits(account.id, price).await.unwrap(),
            DebitOutcome::Debited {
                balance: Decimal::from_str("5.00").unwrap()
            }
        );
        assert_eq!(
            ledger.debit_credits(account.id, price).await.unwrap(),
            DebitOutcome::Debited {
                balance: Decimal::ZERO
            }
        );
        assert_eq!(
            ledger.debit_credits(account.id, price).await.unwrap(),
            DebitOutcome::Insufficient {
                balance: Decimal::ZERO
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overspend() {
        let (ledger, _dir) = create_test_ledger().await;
        let ledger = Arc::new(ledger);
        let account = ledger.create_account(new_account("tok-a")).await.unwrap();
        ledger
            .credit_account(account.id, Decimal::from_str("5.00").unwrap())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .debit_credits(account.id, Decimal::from_str("5.00").unwrap())
                    .await
                    .unwrap()
            }));
        }

        let mut debited = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), DebitOutcome::Debited { .. }) {
                debited += 1;
            }
        }
        assert_eq!(debited, 1);
    }

    #[tokio::test]
    async fn test_debit_unknown_account() {
        let (ledger, _dir) = create_test_ledger().await;
        let result = ledger.debit_credits(42, Decimal::ONE).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_free_trial_claim() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account(new_account("tok-a")).await.unwrap();

        assert!(ledger.claim_free_trial(account.id).await.unwrap());
        assert!(!ledger.claim_free_trial(account.id).await.unwrap());
        assert!(ledger.claim_free_trial(999).await.is_err());

        assert!(ledger.release_free_trial(account.id).await.unwrap());
        assert!(!ledger.release_free_trial(account.id).await.unwrap());
        assert!(ledger.claim_free_trial(account.id).await.unwrap());
        assert!(ledger.release_free_trial(999).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_messages_and_tool_usage() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account(new_account("tok-a")).await.unwrap();

        let session = ledger
            .find_or_create_session("chat-1", Some(account.id))
            .await
            .unwrap();
        let again = ledger.find_or_create_session("chat-1", None).await.unwrap();
        assert_eq!(session.id, again.id);
        assert_eq!(again.account_id, Some(account.id));

        ledger
            .append_message(NewChatMessage {
                session_id: session.id,
                account_id: Some(account.id),
                role: MessageRole::User,
                content: "Is WPA2 still safe?".to_string(),
                metadata: None,
                cost: Some(Decimal::from_str("5.00").unwrap()),
            })
            .await
            .unwrap();
        ledger
            .append_message(NewChatMessage {
                session_id: session.id,
                account_id: Some(account.id),
                role: MessageRole::Assistant,
                content: "Prefer WPA3 where available.".to_string(),
                metadata: Some(serde_json::json!({"model": "test"})),
                cost: None,
            })
            .await
            .unwrap();

        let messages = ledger.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].cost, Some(Decimal::from_str("5.00").unwrap()));
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].cost, None);
        assert_eq!(messages[1].metadata.as_ref().unwrap()["model"], "test");

        ledger
            .record_tool_usage(NewToolUsage {
                account_id: Some(account.id),
                tool_name: ToolName::PasswordStrength,
                input: "password_provided".to_string(),
                result: Some(serde_json::json!({"score": 90})),
            })
            .await
            .unwrap();
        let usage = ledger.account_tool_usage(account.id).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].tool_name, ToolName::PasswordStrength);
        assert_eq!(usage[0].result.as_ref().unwrap()["score"], 90);
    }

    #[tokio::test]
    async fn test_message_for_missing_session_is_not_found() {
        let (ledger, _dir) = create_test_ledger().await;
        let result = ledger
            .append_message(NewChatMessage {
                session_id: 77,
                account_id: None,
                role: MessageRole::User,
                content: "orphan".to_string(),
                metadata: None,
                cost: None,
            })
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
