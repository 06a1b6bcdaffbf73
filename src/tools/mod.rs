/// Free security tools
///
/// Every invocation runs: tool-bucket rate limit, input validation, the
/// heuristic itself, then one usage record. Tools never create accounts;
/// usage is attributed only when the caller's cookie names an existing one.

pub mod password;
pub mod phishing;
pub mod web;

pub use web::WebInspector;

use crate::{
    error::{ApiError, ApiResult},
    identity::{ClientIdentity, IdentityResolver},
    ledger::{LedgerStore, NewToolUsage, ToolName},
    metrics,
    rate_limit::{Bucket, RateLimiter},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored instead of the password itself
pub const PASSWORD_INPUT_DESCRIPTOR: &str = "password_provided";

/// Validated tool input
#[derive(Debug, Clone, PartialEq)]
enum ToolInput {
    Password(String),
    Url(String),
    Domain(String),
}

impl ToolInput {
    fn from_body(tool: ToolName, body: &Value) -> ApiResult<Self> {
        match tool {
            ToolName::PasswordStrength => {
                required_field(body, "password", "Password is required").map(ToolInput::Password)
            }
            ToolName::SslCheck => required_field(body, "domain", "Domain is required")
                .and_then(|raw| web::normalize_domain(&raw))
                .map(ToolInput::Domain),
            ToolName::WebsiteSecurity | ToolName::PhishingDetector | ToolName::SecurityHeaders => {
                required_field(body, "url", "URL is required").map(ToolInput::Url)
            }
        }
    }

    /// What goes into the usage record
    fn descriptor(&self) -> &str {
        match self {
            ToolInput::Password(_) => PASSWORD_INPUT_DESCRIPTOR,
            ToolInput::Url(url) => url,
            ToolInput::Domain(domain) => domain,
        }
    }
}

fn required_field(body: &Value, field: &str, message: &str) -> ApiResult<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

#[derive(Clone)]
pub struct ToolService {
    ledger: Arc<dyn LedgerStore>,
    identity: IdentityResolver,
    rate_limiter: RateLimiter,
    inspector: WebInspector,
}

impl ToolService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        rate_limiter: RateLimiter,
        inspector: WebInspector,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(ledger.clone()),
            ledger,
            rate_limiter,
            inspector,
        }
    }

    pub async fn invoke(&self, tool: ToolName, client: &ClientIdentity, body: &Value) -> ApiResult<Value> {
        self.rate_limiter.check_bucket(Bucket::Tool, &client.ip_address)?;

        let input = ToolInput::from_body(tool, body)?;

        let result = match self.run(tool, &input).await {
            Ok(result) => {
                metrics::record_tool_invocation(tool.as_str(), true);
                result
            }
            Err(e) => {
                metrics::record_tool_invocation(tool.as_str(), false);
                warn!(tool = %tool, error = %e, "Tool invocation failed");
                return Err(e);
            }
        };

        let account_id = self.identity.lookup(client).await?.map(|account| account.id);
        self.ledger
            .record_tool_usage(NewToolUsage {
                account_id,
                tool_name: tool,
                input: input.descriptor().to_string(),
                result: Some(result.clone()),
            })
            .await?;

        debug!(tool = %tool, account_id = ?account_id, ip = %client.ip_address, "Tool usage recorded");
        Ok(result)
    }

    async fn run(&self, tool: ToolName, input: &ToolInput) -> ApiResult<Value> {
        let value = match (tool, input) {
            (ToolName::PasswordStrength, ToolInput::Password(password)) => {
                serde_json::to_value(password::analyze(password))
            }
            (ToolName::PhishingDetector, ToolInput::Url(url)) => {
                serde_json::to_value(phishing::analyze(url)?)
            }
            (ToolName::SecurityHeaders, ToolInput::Url(url)) => {
                serde_json::to_value(self.inspector.check_headers(url).await?)
            }
            (ToolName::WebsiteSecurity, ToolInput::Url(url)) => {
                serde_json::to_value(self.inspector.scan_website(url).await?)
            }
            (ToolName::SslCheck, ToolInput::Domain(domain)) => {
                serde_json::to_value(self.inspector.check_ssl(domain).await)
            }
            _ => return Err(ApiError::Internal(format!("Input does not match tool {}", tool))),
        };

        value.map_err(|e| ApiError::Internal(format!("Failed to encode {} result: {}", tool, e)))
    }
}
