/// Payment-intent collaborator
///
/// Stripe is spoken to over its form-encoded REST API; no SDK.
use crate::{
    config::PaymentsConfig,
    error::{ApiError, ApiResult},
    ledger::to_cents,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// What the browser needs to confirm a card payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount` in major currency units
    async fn create_payment_intent(&self, amount: Decimal, currency: &str) -> ApiResult<PaymentIntent>;

    fn is_configured(&self) -> bool;
}

/// Stand-in used when no Stripe key is configured; every call is refused
#[derive(Debug, Default, Clone)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_payment_intent(&self, _amount: Decimal, _currency: &str) -> ApiResult<PaymentIntent> {
        Err(ApiError::ServiceUnavailable(
            "Payment processing not configured".to_string(),
        ))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

pub struct StripeGateway {
    http_client: Client,
    api_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    client_secret: String,
}

impl StripeGateway {
    pub fn new(config: &PaymentsConfig, secret_key: String) -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: config.stripe_api_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, amount: Decimal, currency: &str) -> ApiResult<PaymentIntent> {
        let cents = to_cents(amount)?;
        let endpoint = format!("{}/payment_intents", self.api_url);

        debug!(amount_cents = cents, currency, "Creating payment intent");

        let form = [
            ("amount", cents.to_string()),
            ("currency", currency.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .http_client
            .post(&endpoint)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to reach payment gateway: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(%status, "Payment gateway rejected payment intent");
            return Err(ApiError::Upstream(format!(
                "Payment gateway returned error {}: {}",
                status, error_body
            )));
        }

        let intent: StripePaymentIntent = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid payment gateway response: {}", e)))?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Build the gateway matching the configuration
pub fn from_config(config: &PaymentsConfig) -> ApiResult<std::sync::Arc<dyn PaymentGateway>> {
    match &config.stripe_secret_key {
        Some(key) => Ok(std::sync::Arc::new(StripeGateway::new(config, key.clone())?)),
        None => Ok(std::sync::Arc::new(UnconfiguredGateway)),
    }
}
