/// Payment endpoints: Stripe payment intents and the PayPal mock flow
use crate::{
    api::middleware::JsonBody,
    billing::PaymentIntent,
    context::AppContext,
    error::ApiResult,
    ledger::validate_amount,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/create-payment-intent", post(create_payment_intent))
        .route("/api/paypal/order", post(create_paypal_order))
        .route("/api/paypal/success", get(paypal_success))
        .route("/api/paypal/cancel", get(paypal_cancel))
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

/// POST /api/create-payment-intent
async fn create_payment_intent(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<PaymentIntentRequest>,
) -> ApiResult<Json<PaymentIntentResponse>> {
    validate_amount(req.amount)?;

    let PaymentIntent { id, client_secret } = ctx
        .payments
        .create_payment_intent(req.amount, &ctx.config.billing.currency)
        .await?;

    info!(intent = %id, amount = %req.amount, "Payment intent created");
    Ok(Json(PaymentIntentResponse { client_secret }))
}

#[derive(Debug, Deserialize)]
pub struct PaypalOrderRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaypalLink {
    pub href: String,
    pub rel: String,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
    pub links: Vec<PaypalLink>,
}

/// POST /api/paypal/order - mock order; no PayPal call is made
async fn create_paypal_order(
    headers: HeaderMap,
    JsonBody(req): JsonBody<PaypalOrderRequest>,
) -> ApiResult<Json<PaypalOrder>> {
    validate_amount(req.amount)?;

    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    let order = PaypalOrder {
        id: format!("PAYPAL_ORDER_{}", chrono::Utc::now().timestamp_millis()),
        status: "CREATED".to_string(),
        links: vec![PaypalLink {
            href: format!(
                "{}://{}/api/paypal/success?token=MOCK_TOKEN&PayerID=MOCK_PAYER",
                scheme, host
            ),
            rel: "approve".to_string(),
            method: "GET".to_string(),
        }],
    };

    info!(
        order = %order.id,
        amount = %req.amount,
        currency = req.currency.as_deref().unwrap_or("USD"),
        intent = req.intent.as_deref().unwrap_or("CAPTURE"),
        "PayPal order created"
    );
    Ok(Json(order))
}

/// GET /api/paypal/success
async fn paypal_success() -> Redirect {
    Redirect::to("/?payment=success&method=paypal")
}

/// GET /api/paypal/cancel
async fn paypal_cancel() -> Redirect {
    Redirect::to("/?payment=cancelled")
}
