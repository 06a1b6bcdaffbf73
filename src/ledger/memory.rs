/// In-memory ledger backend
use crate::{
    error::{ApiError, ApiResult},
    ledger::{
        Account, ChatMessage, ChatSession, DebitOutcome, LedgerStore, NewAccount, NewChatMessage,
        NewToolUsage, ToolUsageRecord,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    account_tokens: HashMap<String, i64>,
    sessions: BTreeMap<i64, ChatSession>,
    session_tokens: HashMap<String, i64>,
    messages: BTreeMap<i64, ChatMessage>,
    tool_usage: BTreeMap<i64, ToolUsageRecord>,
    next_account_id: i64,
    next_session_id: i64,
    next_message_id: i64,
    next_tool_usage_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn account_mut(&mut self, id: i64) -> ApiResult<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("Account {} not found", id)))
    }
}

/// Process-local ledger; every operation runs under one lock, so
/// check-then-act sequences are atomic.
#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_account(&self, new: NewAccount) -> ApiResult<Account> {
        let mut tables = self.tables.write().await;

        if tables.account_tokens.contains_key(&new.session_token) {
            return Err(ApiError::Conflict("Session token already in use".to_string()));
        }

        let id = Tables::next_id(&mut tables.next_account_id);
        let now = Utc::now();
        let account = Account {
            id,
            session_token: new.session_token,
            ip_address: new.ip_address,
            fingerprint: new.fingerprint,
            credits: Decimal::new(0, 2),
            has_used_free_trial: false,
            payment_customer_id: None,
            created_at: now,
            last_seen_at: now,
        };

        tables.account_tokens.insert(account.session_token.clone(), id);
        tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: i64) -> ApiResult<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_token(&self, token: &str) -> ApiResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .account_tokens
            .get(token)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn find_account_by_fingerprint(
        &self,
        fingerprint: &str,
        ip_address: &str,
    ) -> ApiResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.fingerprint.as_deref() == Some(fingerprint) && a.ip_address == ip_address)
            .cloned())
    }

    async fn touch_account(&self, id: i64) -> ApiResult<()> {
        let mut tables = self.tables.write().await;
        tables.account_mut(id)?.last_seen_at = Utc::now();
        Ok(())
    }

    async fn debit_credits(&self, id: i64, amount: Decimal) -> ApiResult<DebitOutcome> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;

        if account.credits < amount {
            return Ok(DebitOutcome::Insufficient {
                balance: account.credits,
            });
        }

        account.credits -= amount;
        Ok(DebitOutcome::Debited {
            balance: account.credits,
        })
    }

    async fn credit_account(&self, id: i64, amount: Decimal) -> ApiResult<Account> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;
        account.credits = account
            .credits
            .checked_add(amount)
            .ok_or_else(|| ApiError::Validation("Credit balance would overflow".to_string()))?;
        Ok(account.clone())
    }

    async fn claim_free_trial(&self, id: i64) -> ApiResult<bool> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;
        if account.has_used_free_trial {
            return Ok(false);
        }
        account.has_used_free_trial = true;
        Ok(true)
    }

    async fn mark_free_trial_used(&self, id: i64) -> ApiResult<()> {
        let mut tables = self.tables.write().await;
        tables.account_mut(id)?.has_used_free_trial = true;
        Ok(())
    }

    async fn release_free_trial(&self, id: i64) -> ApiResult<bool> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;
        if !account.has_used_free_trial {
            return Ok(false);
        }
        account.has_used_free_trial = false;
        Ok(true)
    }

    async fn set_payment_customer(&self, id: i64, customer_id: &str) -> ApiResult<Account> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;
        account.payment_customer_id = Some(customer_id.to_string());
        Ok(account.clone())
    }

    async fn find_or_create_session(
        &self,
        token: &str,
        account_id: Option<i64>,
    ) -> ApiResult<ChatSession> {
        let mut tables = self.tables.write().await;

        if let Some(session) = tables
            .session_tokens
            .get(token)
            .and_then(|id| tables.sessions.get(id))
        {
            return Ok(session.clone());
        }

        let id = Tables::next_id(&mut tables.next_session_id);
        let session = ChatSession {
            id,
            token: token.to_string(),
            account_id,
            created_at: Utc::now(),
        };
        tables.session_tokens.insert(token.to_string(), id);
        tables.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn get_session_by_token(&self, token: &str) -> ApiResult<Option<ChatSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .session_tokens
            .get(token)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    async fn list_account_sessions(&self, account_id: i64) -> ApiResult<Vec<ChatSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.account_id == Some(account_id))
            .cloned()
            .collect())
    }

    async fn append_message(&self, message: NewChatMessage) -> ApiResult<ChatMessage> {
        let mut tables = self.tables.write().await;

        if !tables.sessions.contains_key(&message.session_id) {
            return Err(ApiError::NotFound(format!(
                "Session {} not found",
                message.session_id
            )));
        }

        let id = Tables::next_id(&mut tables.next_message_id);
        let stored = ChatMessage {
            id,
            session_id: message.session_id,
            account_id: message.account_id,
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            cost: message.cost,
            created_at: Utc::now(),
        };
        tables.messages.insert(id, stored.clone());
        Ok(stored)
    }

    async fn session_messages(&self, session_id: i64) -> ApiResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        // BTreeMap iteration is id order, which is creation order
        Ok(tables
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn record_tool_usage(&self, usage: NewToolUsage) -> ApiResult<ToolUsageRecord> {
        let mut tables = self.tables.write().await;
        let id = Tables::next_id(&mut tables.next_tool_usage_id);
        let record = ToolUsageRecord {
            id,
            account_id: usage.account_id,
            tool_name: usage.tool_name,
            input: usage.input,
            result: usage.result,
            created_at: Utc::now(),
        };
        tables.tool_usage.insert(id, record.clone());
        Ok(record)
    }

    async fn account_tool_usage(&self, account_id: i64) -> ApiResult<Vec<ToolUsageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tool_usage
            .values()
            .rev()
            .filter(|r| r.account_id == Some(account_id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> ApiResult<()> {
        let _ = self.tables.read().await;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
