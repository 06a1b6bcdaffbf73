/// Credit Gate - atomic test-and-deduct of the consultation price
use crate::{
    config::FreeTrialPolicy,
    error::{ApiError, ApiResult},
    ledger::{Account, DebitOutcome, LedgerStore},
    metrics,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receipt of a successful authorization, needed to refund or settle later
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub account_id: i64,
    /// Amount actually taken (zero when the free trial waived the price)
    pub amount: Decimal,
    /// Balance right after the deduction
    pub balance: Decimal,
    /// Whether this charge consumed the account's free trial
    pub free_trial: bool,
}

#[derive(Clone)]
pub struct CreditGate {
    ledger: Arc<dyn LedgerStore>,
    price: Decimal,
    policy: FreeTrialPolicy,
}

impl CreditGate {
    pub fn new(ledger: Arc<dyn LedgerStore>, price: Decimal, policy: FreeTrialPolicy) -> Self {
        Self {
            ledger,
            price,
            policy,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn policy(&self) -> FreeTrialPolicy {
        self.policy
    }

    /// Take the price from the account, or refuse without touching the balance
    pub async fn authorize(&self, account: &Account) -> ApiResult<Charge> {
        if self.policy == FreeTrialPolicy::Waive
            && !account.has_used_free_trial
            && self.ledger.claim_free_trial(account.id).await?
        {
            let current = self
                .ledger
                .get_account(account.id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Account {} not found", account.id)))?;

            info!(account_id = account.id, "Free trial consultation claimed");
            return Ok(Charge {
                account_id: account.id,
                amount: Decimal::ZERO,
                balance: current.credits,
                free_trial: true,
            });
        }

        match self.ledger.debit_credits(account.id, self.price).await? {
            DebitOutcome::Debited { balance } => {
                debug!(account_id = account.id, price = %self.price, balance = %balance, "Credits debited");
                metrics::record_credits_debited(self.price);
                Ok(Charge {
                    account_id: account.id,
                    amount: self.price,
                    balance,
                    free_trial: !account.has_used_free_trial,
                })
            }
            DebitOutcome::Insufficient { balance } => {
                warn!(account_id = account.id, price = %self.price, balance = %balance, "Insufficient credits");
                Err(ApiError::InsufficientCredit {
                    required: self.price,
                    available: balance,
                })
            }
        }
    }

    /// Give the charged amount back after a failed consultation, and hand a
    /// waived free trial back to the account
    pub async fn refund(&self, charge: &Charge) -> ApiResult<Decimal> {
        if charge.free_trial && self.policy == FreeTrialPolicy::Waive {
            if self.ledger.release_free_trial(charge.account_id).await? {
                info!(account_id = charge.account_id, "Free trial released");
            }
        }

        if charge.amount.is_zero() {
            return Ok(charge.balance);
        }

        let account = self.ledger.credit_account(charge.account_id, charge.amount).await?;
        metrics::record_credits_refunded(charge.amount);
        info!(
            account_id = charge.account_id,
            amount = %charge.amount,
            balance = %account.credits,
            "Consultation charge refunded"
        );
        Ok(account.credits)
    }

    /// Record that a consultation completed; flips the free-trial flag
    pub async fn settle(&self, charge: &Charge) -> ApiResult<()> {
        if charge.free_trial && self.policy == FreeTrialPolicy::Charge {
            self.ledger.mark_free_trial_used(charge.account_id).await?;
            debug!(account_id = charge.account_id, "Free trial marked used");
        }
        Ok(())
    }
}
