/// Admin endpoints
use crate::{
    api::{middleware::JsonBody, ProfileResponse},
    auth::AdminAuthContext,
    context::AppContext,
    error::{ApiError, ApiResult},
    ledger::validate_amount,
};
use axum::{extract::State, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/admin/credits", post(grant_credits))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsRequest {
    pub account_id: i64,
    pub amount: Decimal,
    /// External payment customer the top-up was verified against
    #[serde(default)]
    pub payment_customer_id: Option<String>,
}

/// POST /api/admin/credits - manual top-up after a verified payment
async fn grant_credits(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    JsonBody(req): JsonBody<GrantCreditsRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    validate_amount(req.amount)?;

    ctx.ledger
        .get_account(req.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Account {} not found", req.account_id)))?;

    let mut account = ctx.ledger.credit_account(req.account_id, req.amount).await?;
    if let Some(customer) = req.payment_customer_id.as_deref().filter(|c| !c.is_empty()) {
        account = ctx.ledger.set_payment_customer(account.id, customer).await?;
    }

    info!(
        account_id = account.id,
        amount = %req.amount,
        balance = %account.credits,
        "Credits granted by admin"
    );
    Ok(Json(ProfileResponse::from(&account)))
}
