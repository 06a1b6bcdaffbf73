/// API routes and handlers
pub mod admin;
pub mod consultation;
pub mod health;
pub mod middleware;
pub mod payments;
pub mod stats;
pub mod tools;
pub mod user;


use crate::{context::AppContext, ledger::{format_credits, Account}};
use axum::Router;
use serde::Serialize;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(consultation::routes())
        .merge(user::routes())
        .merge(tools::routes())
        .merge(payments::routes())
        .merge(admin::routes())
        .merge(stats::routes())
}

/// Public view of an account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub credits: String,
    pub has_used_free_question: bool,
}

impl From<&Account> for ProfileResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            credits: format_credits(account.credits),
            has_used_free_question: account.has_used_free_trial,
        }
    }
}
