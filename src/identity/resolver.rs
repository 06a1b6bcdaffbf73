/// Identity Resolver - session token first, then fingerprint+address, then create
use crate::{
    error::ApiResult,
    identity::ClientIdentity,
    ledger::{Account, LedgerStore, NewAccount},
    metrics,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Resolves callers to accounts through the ledger
#[derive(Clone)]
pub struct IdentityResolver {
    ledger: Arc<dyn LedgerStore>,
}

impl IdentityResolver {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Resolve the caller to exactly one account, creating it as a last resort
    pub async fn resolve(&self, client: &ClientIdentity) -> ApiResult<Account> {
        if let Some(account) = self.lookup(client).await? {
            self.ledger.touch_account(account.id).await?;
            return Ok(account);
        }

        let account = self
            .ledger
            .create_account(NewAccount {
                session_token: Self::generate_token(),
                ip_address: client.ip_address.clone(),
                fingerprint: client.fingerprint.clone(),
            })
            .await?;
        metrics::record_account_created();

        info!(
            account_id = account.id,
            ip = %client.ip_address,
            has_fingerprint = client.fingerprint.is_some(),
            "Created anonymous account"
        );

        Ok(account)
    }

    /// Find an existing account without ever creating one
    pub async fn lookup(&self, client: &ClientIdentity) -> ApiResult<Option<Account>> {
        if let Some(token) = &client.session_token {
            if let Some(account) = self.ledger.find_account_by_token(token).await? {
                debug!(account_id = account.id, "Resolved account by session token");
                return Ok(Some(account));
            }
        }

        if let Some(fingerprint) = &client.fingerprint {
            if let Some(account) = self
                .ledger
                .find_account_by_fingerprint(fingerprint, &client.ip_address)
                .await?
            {
                debug!(account_id = account.id, "Resolved account by fingerprint and address");
                return Ok(Some(account));
            }
        }

        Ok(None)
    }

    fn generate_token() -> String {
        Uuid::new_v4().to_string()
    }
}
