/// Consultation Orchestrator
///
/// rate check -> identity -> credit gate -> session -> question ->
/// guidance -> analysis -> answer. Everything after the credit gate runs
/// inside a compensating boundary: if it fails, the charge is refunded.

pub mod stage;

pub use stage::{ConsultationStage, StageTracker};

use crate::{
    advisor::{AnalysisProvider, GuidanceProvider, TokenUsage},
    billing::{Charge, CreditGate},
    error::{ApiError, ApiResult},
    identity::{ClientIdentity, IdentityResolver},
    ledger::{format_credits, Account, ChatSession, LedgerStore, MessageRole, NewChatMessage},
    metrics,
    rate_limit::{Bucket, RateLimiter},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Consultation request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequest {
    /// Kept loose so a non-string question is a bad request, not a decode error
    #[serde(default)]
    pub question: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationMetadata {
    pub guidance_model: String,
    pub analysis_model: String,
    pub tokens: TokenUsage,
    pub timestamp: DateTime<Utc>,
    /// At least one collaborator answered with placeholder output
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationResponse {
    pub response: String,
    pub citations: Vec<String>,
    pub session_id: String,
    pub metadata: ConsultationMetadata,
    pub remaining_credits: String,
}

/// Result of one consultation plus the account it resolved to, if it got
/// that far (the caller needs it to re-issue the session cookie)
#[derive(Debug)]
pub struct ConsultationOutcome {
    pub account: Option<Account>,
    pub result: ApiResult<ConsultationResponse>,
}

#[derive(Clone)]
pub struct ConsultationService {
    ledger: Arc<dyn LedgerStore>,
    identity: IdentityResolver,
    gate: CreditGate,
    rate_limiter: RateLimiter,
    guidance: Arc<dyn GuidanceProvider>,
    analysis: Arc<dyn AnalysisProvider>,
}

impl ConsultationService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gate: CreditGate,
        rate_limiter: RateLimiter,
        guidance: Arc<dyn GuidanceProvider>,
        analysis: Arc<dyn AnalysisProvider>,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(ledger.clone()),
            ledger,
            gate,
            rate_limiter,
            guidance,
            analysis,
        }
    }

    pub fn price(&self) -> rust_decimal::Decimal {
        self.gate.price()
    }

    pub async fn consult(&self, client: &ClientIdentity, request: ConsultationRequest) -> ConsultationOutcome {
        let mut tracker = StageTracker::new(Uuid::new_v4().to_string());
        let mut account = None;

        let result = self.run(&mut tracker, &mut account, client, request).await;

        let outcome = match &result {
            Ok(_) => ConsultationStage::Responded.as_str(),
            Err(_) if tracker.current().is_terminal() => tracker.current().as_str(),
            Err(_) => "internal_error",
        };
        metrics::record_consultation(outcome);

        ConsultationOutcome { account, result }
    }

    async fn run(
        &self,
        tracker: &mut StageTracker,
        resolved: &mut Option<Account>,
        client: &ClientIdentity,
        request: ConsultationRequest,
    ) -> ApiResult<ConsultationResponse> {
        let question = match request.question.as_str().filter(|q| !q.trim().is_empty()) {
            Some(question) => question.to_string(),
            None => {
                tracker.fail(ConsultationStage::RejectedBadInput);
                return Err(ApiError::Validation("Question is required".to_string()));
            }
        };

        if let Err(e) = self.rate_limiter.check_bucket(Bucket::Consultation, &client.ip_address) {
            tracker.fail(ConsultationStage::RejectedRateLimit);
            return Err(e);
        }
        tracker.advance();

        let account = self.identity.resolve(client).await?;
        *resolved = Some(account.clone());
        tracker.advance();

        let charge = match self.gate.authorize(&account).await {
            Ok(charge) => charge,
            Err(e) => {
                if matches!(e, ApiError::InsufficientCredit { .. }) {
                    tracker.fail(ConsultationStage::RejectedNoCredit);
                }
                return Err(e);
            }
        };
        tracker.advance();

        match self.fulfil(tracker, &account, &charge, &question, request.session_id).await {
            Ok(response) => {
                if let Ok(Some(fresh)) = self.ledger.get_account(account.id).await {
                    *resolved = Some(fresh);
                }
                info!(
                    account_id = account.id,
                    session = %response.session_id,
                    remaining = %response.remaining_credits,
                    "Consultation answered"
                );
                Ok(response)
            }
            Err(e) => {
                if matches!(e, ApiError::Upstream(_)) {
                    tracker.fail(ConsultationStage::FailedUpstream);
                } else {
                    warn!(
                        account_id = account.id,
                        stage = %tracker.current(),
                        error = %e,
                        "Consultation failed after charge"
                    );
                }
                match self.gate.refund(&charge).await {
                    Ok(balance) => info!(account_id = account.id, balance = %balance, "Refunded failed consultation"),
                    Err(refund_err) => error!(
                        account_id = account.id,
                        amount = %charge.amount,
                        error = %refund_err,
                        "Refund after failed consultation did not go through"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Work done after the charge; any error here triggers the refund
    async fn fulfil(
        &self,
        tracker: &mut StageTracker,
        account: &Account,
        charge: &Charge,
        question: &str,
        session_token: Option<String>,
    ) -> ApiResult<ConsultationResponse> {
        let token = session_token
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self.ledger.find_or_create_session(&token, Some(account.id)).await?;
        tracker.advance();

        self.ledger
            .append_message(NewChatMessage {
                session_id: session.id,
                account_id: Some(account.id),
                role: MessageRole::User,
                content: question.to_string(),
                metadata: None,
                cost: Some(charge.amount),
            })
            .await?;
        tracker.advance();

        let guidance = self.guidance.guidance(question).await?;
        tracker.advance();

        let analysis = self.analysis.analyze(question, &guidance).await?;
        tracker.advance();

        let metadata = ConsultationMetadata {
            guidance_model: guidance.model.clone(),
            analysis_model: analysis.model.clone(),
            tokens: guidance.usage.clone(),
            timestamp: Utc::now(),
            demo: guidance.demo || analysis.demo,
        };

        self.persist_answer(&session, account, &analysis.content, &guidance.citations, &metadata)
            .await?;
        tracker.advance();

        // The answer is already stored; a missed flag update must not undo it
        if let Err(e) = self.gate.settle(charge).await {
            error!(account_id = account.id, error = %e, "Failed to settle consultation");
        }
        tracker.advance();

        Ok(ConsultationResponse {
            response: analysis.content,
            citations: guidance.citations,
            session_id: session.token,
            metadata,
            remaining_credits: format_credits(charge.balance),
        })
    }

    async fn persist_answer(
        &self,
        session: &ChatSession,
        account: &Account,
        content: &str,
        citations: &[String],
        metadata: &ConsultationMetadata,
    ) -> ApiResult<()> {
        let mut stored = serde_json::to_value(metadata)
            .map_err(|e| ApiError::Internal(format!("Failed to encode metadata: {}", e)))?;
        if let Some(object) = stored.as_object_mut() {
            object.insert("citations".to_string(), serde_json::json!(citations));
        }

        self.ledger
            .append_message(NewChatMessage {
                session_id: session.id,
                account_id: Some(account.id),
                role: MessageRole::Assistant,
                content: content.to_string(),
                metadata: Some(stored),
                cost: None,
            })
            .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::{
        config::{FreeTrialPolicy, ServerConfig},
        ledger::MemoryLedger,
    };
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::atomic::Ordering;

    struct Fixture {
        service: ConsultationService,
        ledger: Arc<MemoryLedger>,
        guidance: Arc<StaticGuidance>,
    }

    fn create_fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let guidance = Arc::new(StaticGuidance::default());
        let service = ConsultationService::new(
            ledger.clone(),
            CreditGate::new(ledger.clone(), Decimal::from_str("5.00").unwrap(), FreeTrialPolicy::Charge),
            RateLimiter::new(&ServerConfig::local().rate_limit),
            guidance.clone(),
            Arc::new(EchoAnalysis),
        );
        Fixture {
            service,
            ledger,
            guidance,
        }
    }

    async fn funded_client(fixture: &Fixture, credits: &str) -> (ClientIdentity, Account) {
        let client = ClientIdentity::new("203.0.113.7");
        let account = fixture.service.identity.resolve(&client).await.unwrap();
        let account = fixture
            .ledger
            .credit_account(account.id, Decimal::from_str(credits).unwrap())
            .await
            .unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));
        (client, account)
    }

    fn ask(question: &str, session: Option<&str>) -> ConsultationRequest {
        ConsultationRequest {
            question: json!(question),
            session_id: session.map(str::to_string),
            fingerprint: None,
        }
    }

    #[tokio::test]
    async fn test_balance_goes_down_by_price_and_never_below_zero() {
        let fixture = create_fixture();
        let (client, account) = funded_client(&fixture, "10.00").await;

        let first = fixture.service.consult(&client, ask("What is XSS?", None)).await;
        assert_eq!(first.result.unwrap().remaining_credits, "5.00");
        assert!(first.account.unwrap().has_used_free_trial);

        let second = fixture.service.consult(&client, ask("What is CSRF?", None)).await;
        assert_eq!(second.result.unwrap().remaining_credits, "0.00");

        let third = fixture.service.consult(&client, ask("What is SSRF?", None)).await;
        match third.result {
            Err(ApiError::InsufficientCredit { required, available }) => {
                assert_eq!(required, Decimal::from_str("5.00").unwrap());
                assert!(available.is_zero());
            }
            other => panic!("expected InsufficientCredit, got {:?}", other),
        }

        let account = fixture.ledger.get_account(account.id).await.unwrap().unwrap();
        assert!(account.credits.is_zero());
        assert!(account.has_used_free_trial);
        assert_eq!(fixture.guidance.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_input_has_no_side_effects() {
        let fixture = create_fixture();

        for question in [json!(null), json!(42), json!("   ")] {
            let outcome = fixture
                .service
                .consult(
                    &ClientIdentity::new("203.0.113.7"),
                    ConsultationRequest {
                        question,
                        ..Default::default()
                    },
                )
                .await;
            assert!(matches!(outcome.result, Err(ApiError::Validation(_))));
            assert!(outcome.account.is_none());
        }
        assert!(fixture.ledger.get_account(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_credit_writes_no_messages() {
        let fixture = create_fixture();
        let (client, _) = funded_client(&fixture, "0.00").await;

        let outcome = fixture.service.consult(&client, ask("Hello?", Some("sess-empty"))).await;
        assert!(matches!(outcome.result, Err(ApiError::InsufficientCredit { .. })));
        assert!(outcome.account.is_some());
        assert!(fixture.ledger.get_session_by_token("sess-empty").await.unwrap().is_none());
        assert_eq!(fixture.guidance.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_messages_alternate_question_answer() {
        let fixture = create_fixture();
        let (client, _) = funded_client(&fixture, "15.00").await;

        for question in ["one", "two", "three"] {
            let outcome = fixture.service.consult(&client, ask(question, Some("sess-1"))).await;
            assert_eq!(outcome.result.unwrap().session_id, "sess-1");
        }

        let session = fixture.ledger.get_session_by_token("sess-1").await.unwrap().unwrap();
        let messages = fixture.ledger.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 6);
        for (pair, question) in messages.chunks(2).zip(["one", "two", "three"]) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[0].content, question);
            assert_eq!(pair[0].cost, Some(Decimal::from_str("5.00").unwrap()));
            assert_eq!(pair[1].role, MessageRole::Assistant);
            assert_eq!(pair[1].cost, None);
            assert_eq!(pair[1].metadata.as_ref().unwrap()["citations"][0], "https://owasp.org");
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_refunds_and_keeps_question() {
        let ledger = Arc::new(MemoryLedger::new());
        let service = ConsultationService::new(
            ledger.clone(),
            CreditGate::new(ledger.clone(), Decimal::from_str("5.00").unwrap(), FreeTrialPolicy::Charge),
            RateLimiter::new(&ServerConfig::local().rate_limit),
            Arc::new(FailingGuidance),
            Arc::new(EchoAnalysis),
        );

        let client = ClientIdentity::new("203.0.113.7");
        let account = service.identity.resolve(&client).await.unwrap();
        ledger
            .credit_account(account.id, Decimal::from_str("5.00").unwrap())
            .await
            .unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));

        let outcome = service.consult(&client, ask("Is my VPN safe?", Some("sess-fail"))).await;
        assert!(matches!(outcome.result, Err(ApiError::Upstream(_))));

        let account = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.credits, Decimal::from_str("5.00").unwrap());
        assert!(!account.has_used_free_trial);

        let session = ledger.get_session_by_token("sess-fail").await.unwrap().unwrap();
        let messages = ledger.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    /// Guidance double failing with a non-collaborator error
    struct BrokenGuidance;

    #[async_trait::async_trait]
    impl GuidanceProvider for BrokenGuidance {
        async fn guidance(&self, _question: &str) -> ApiResult<crate::advisor::Guidance> {
            Err(ApiError::Internal("disk full".to_string()))
        }
    }

    fn service_with(
        guidance: Arc<dyn GuidanceProvider>,
        policy: FreeTrialPolicy,
    ) -> (ConsultationService, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let service = ConsultationService::new(
            ledger.clone(),
            CreditGate::new(ledger.clone(), Decimal::from_str("5.00").unwrap(), policy),
            RateLimiter::new(&ServerConfig::local().rate_limit),
            guidance,
            Arc::new(EchoAnalysis),
        );
        (service, ledger)
    }

    #[tokio::test]
    async fn test_waive_policy_first_question_free_then_charged() {
        let (service, ledger) = service_with(Arc::new(StaticGuidance::default()), FreeTrialPolicy::Waive);
        let client = ClientIdentity::new("203.0.113.8");
        let account = service.identity.resolve(&client).await.unwrap();
        ledger
            .credit_account(account.id, Decimal::from_str("5.00").unwrap())
            .await
            .unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));

        let free = service.consult(&client, ask("Free one?", Some("sess-waive"))).await;
        assert_eq!(free.result.unwrap().remaining_credits, "5.00");
        assert!(free.account.unwrap().has_used_free_trial);

        let paid = service.consult(&client, ask("Paid one?", Some("sess-waive"))).await;
        assert_eq!(paid.result.unwrap().remaining_credits, "0.00");

        let refused = service.consult(&client, ask("Third?", Some("sess-waive"))).await;
        assert!(matches!(refused.result, Err(ApiError::InsufficientCredit { .. })));

        let session = ledger.get_session_by_token("sess-waive").await.unwrap().unwrap();
        let costs: Vec<_> = ledger
            .session_messages(session.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.cost)
            .collect();
        assert_eq!(costs, vec![Some(Decimal::ZERO), Some(Decimal::from_str("5.00").unwrap())]);

        let account = ledger.get_account(account.id).await.unwrap().unwrap();
        assert!(account.has_used_free_trial);
    }

    #[tokio::test]
    async fn test_waive_policy_failed_first_question_keeps_trial() {
        let (service, ledger) = service_with(Arc::new(FailingGuidance), FreeTrialPolicy::Waive);
        let client = ClientIdentity::new("203.0.113.9");
        let account = service.identity.resolve(&client).await.unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));

        let outcome = service.consult(&client, ask("Will this fail?", None)).await;
        assert!(matches!(outcome.result, Err(ApiError::Upstream(_))));

        let account = ledger.get_account(account.id).await.unwrap().unwrap();
        assert!(!account.has_used_free_trial);
        assert!(account.credits.is_zero());

        // Still eligible for the free question
        let retry = service.consult(&client, ask("Will this fail?", None)).await;
        assert!(matches!(retry.result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_consultation_bucket_refuses_eleventh_request() {
        let fixture = create_fixture();
        let (client, account) = funded_client(&fixture, "0.00").await;
        let client = ClientIdentity {
            ip_address: "198.51.100.23".to_string(),
            ..client
        };

        for _ in 0..10 {
            let outcome = fixture.service.consult(&client, ask("Anyone there?", None)).await;
            assert!(matches!(outcome.result, Err(ApiError::InsufficientCredit { .. })));
        }

        let stranger = ClientIdentity::new("198.51.100.23");
        let limited = fixture.service.consult(&stranger, ask("Anyone there?", None)).await;
        match limited.result {
            Err(ApiError::RateLimitExceeded { bucket, retry_after }) => {
                assert_eq!(bucket, "consultation");
                assert!(retry_after.as_secs() <= 900);
            }
            other => panic!("expected RateLimitExceeded, got {:?}", other),
        }
        assert!(limited.account.is_none());
        assert!(fixture.ledger.get_account(account.id + 1).await.unwrap().is_none());
        assert_eq!(fixture.guidance.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_collaborator_failure_is_labelled_internal() {
        let (service, ledger) = service_with(Arc::new(BrokenGuidance), FreeTrialPolicy::Charge);
        let client = ClientIdentity::new("203.0.113.10");
        let account = service.identity.resolve(&client).await.unwrap();
        ledger
            .credit_account(account.id, Decimal::from_str("5.00").unwrap())
            .await
            .unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));

        let internal = metrics::CONSULTATIONS_TOTAL.with_label_values(&["internal_error"]);
        let before = internal.get();

        let outcome = service.consult(&client, ask("Broken?", None)).await;
        assert!(matches!(outcome.result, Err(ApiError::Internal(_))));
        assert!(internal.get() > before);

        let account = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.credits, Decimal::from_str("5.00").unwrap());
    }

    /// Ledger whose free-trial flag update always fails
    struct StuckFlagLedger(MemoryLedger);

    #[async_trait::async_trait]
    impl LedgerStore for StuckFlagLedger {
        async fn create_account(&self, new: crate::ledger::NewAccount) -> ApiResult<Account> {
            self.0.create_account(new).await
        }
        async fn get_account(&self, id: i64) -> ApiResult<Option<Account>> {
            self.0.get_account(id).await
        }
        async fn find_account_by_token(&self, token: &str) -> ApiResult<Option<Account>> {
            self.0.find_account_by_token(token).await
        }
        async fn find_account_by_fingerprint(
            &self,
            fingerprint: &str,
            ip_address: &str,
        ) -> ApiResult<Option<Account>> {
            self.0.find_account_by_fingerprint(fingerprint, ip_address).await
        }
        async fn touch_account(&self, id: i64) -> ApiResult<()> {
            self.0.touch_account(id).await
        }
        async fn debit_credits(&self, id: i64, amount: Decimal) -> ApiResult<crate::ledger::DebitOutcome> {
            self.0.debit_credits(id, amount).await
        }
        async fn credit_account(&self, id: i64, amount: Decimal) -> ApiResult<Account> {
            self.0.credit_account(id, amount).await
        }
        async fn claim_free_trial(&self, id: i64) -> ApiResult<bool> {
            self.0.claim_free_trial(id).await
        }
        async fn mark_free_trial_used(&self, _id: i64) -> ApiResult<()> {
            Err(ApiError::Internal("flag column locked".to_string()))
        }
        async fn release_free_trial(&self, id: i64) -> ApiResult<bool> {
            self.0.release_free_trial(id).await
        }
        async fn set_payment_customer(&self, id: i64, customer_id: &str) -> ApiResult<Account> {
            self.0.set_payment_customer(id, customer_id).await
        }
        async fn find_or_create_session(
            &self,
            token: &str,
            account_id: Option<i64>,
        ) -> ApiResult<ChatSession> {
            self.0.find_or_create_session(token, account_id).await
        }
        async fn get_session_by_token(&self, token: &str) -> ApiResult<Option<ChatSession>> {
            self.0.get_session_by_token(token).await
        }
        async fn list_account_sessions(&self, account_id: i64) -> ApiResult<Vec<ChatSession>> {
            self.0.list_account_sessions(account_id).await
        }
        async fn append_message(&self, message: NewChatMessage) -> ApiResult<crate::ledger::ChatMessage> {
            self.0.append_message(message).await
        }
        async fn session_messages(&self, session_id: i64) -> ApiResult<Vec<crate::ledger::ChatMessage>> {
            self.0.session_messages(session_id).await
        }
        async fn record_tool_usage(
            &self,
            usage: crate::ledger::NewToolUsage,
        ) -> ApiResult<crate::ledger::ToolUsageRecord> {
            self.0.record_tool_usage(usage).await
        }
        async fn account_tool_usage(&self, account_id: i64) -> ApiResult<Vec<crate::ledger::ToolUsageRecord>> {
            self.0.account_tool_usage(account_id).await
        }
        async fn ping(&self) -> ApiResult<()> {
            self.0.ping().await
        }
        fn backend(&self) -> &'static str {
            "stuck-flag"
        }
    }

    #[tokio::test]
    async fn test_settle_failure_keeps_stored_answer_and_charge() {
        let ledger = Arc::new(StuckFlagLedger(MemoryLedger::new()));
        let service = ConsultationService::new(
            ledger.clone(),
            CreditGate::new(ledger.clone(), Decimal::from_str("5.00").unwrap(), FreeTrialPolicy::Charge),
            RateLimiter::new(&ServerConfig::local().rate_limit),
            Arc::new(StaticGuidance::default()),
            Arc::new(EchoAnalysis),
        );
        let client = ClientIdentity::new("203.0.113.11");
        let account = service.identity.resolve(&client).await.unwrap();
        ledger
            .credit_account(account.id, Decimal::from_str("5.00").unwrap())
            .await
            .unwrap();
        let client = client.with_session_token(Some(account.session_token.clone()));

        let outcome = service.consult(&client, ask("Still answered?", Some("sess-stuck"))).await;
        assert_eq!(outcome.result.unwrap().remaining_credits, "0.00");

        let account = ledger.get_account(account.id).await.unwrap().unwrap();
        assert!(account.credits.is_zero());

        let session = ledger.get_session_by_token("sess-stuck").await.unwrap().unwrap();
        let messages = ledger.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_concurrent_consultations_one_price_available() {
        let fixture = create_fixture();
        let (client, account) = funded_client(&fixture, "5.00").await;

        let (a, b) = tokio::join!(
            fixture.service.consult(&client, ask("first", None)),
            fixture.service.consult(&client, ask("second", None))
        );

        let results = [a.result, b.result];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ApiError::InsufficientCredit { .. })))
                .count(),
            1
        );

        let account = fixture.ledger.get_account(account.id).await.unwrap().unwrap();
        assert!(account.credits.is_zero());
    }
}
