/// Ledger entities
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Anonymous end user holding a credit balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub session_token: String,
    pub ip_address: String,
    /// Weak secondary identity hint, never unique
    pub fingerprint: Option<String>,
    pub credits: Decimal,
    pub has_used_free_trial: bool,
    /// External payment-customer reference (Stripe customer id)
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Fields supplied when creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub session_token: String,
    pub ip_address: String,
    pub fingerprint: Option<String>,
}

/// Conversation grouping under an externally visible token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: i64,
    #[serde(rename = "sessionId")]
    pub token: String,
    #[serde(rename = "userId")]
    pub account_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl FromStr for MessageRole {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(ApiError::Internal(format!("Unknown message role: {}", other))),
        }
    }
}

/// One turn of a conversation; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    #[serde(rename = "userId")]
    pub account_id: Option<i64>,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    /// Price charged for this turn; only set on billed user messages
    pub cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: i64,
    pub account_id: Option<i64>,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub cost: Option<Decimal>,
}

/// Free heuristic tools offered next to the consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolName {
    PasswordStrength,
    WebsiteSecurity,
    SslCheck,
    PhishingDetector,
    SecurityHeaders,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::PasswordStrength,
        ToolName::WebsiteSecurity,
        ToolName::SslCheck,
        ToolName::PhishingDetector,
        ToolName::SecurityHeaders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::PasswordStrength => "password-strength",
            ToolName::WebsiteSecurity => "website-security",
            ToolName::SslCheck => "ssl-check",
            ToolName::PhishingDetector => "phishing-detector",
            ToolName::SecurityHeaders => "security-headers",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown tool: {}", s)))
    }
}

/// Audit trail of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsageRecord {
    pub id: i64,
    #[serde(rename = "userId")]
    pub account_id: Option<i64>,
    pub tool_name: ToolName,
    /// Never the raw secret for sensitive tools
    pub input: String,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewToolUsage {
    pub account_id: Option<i64>,
    pub tool_name: ToolName,
    pub input: String,
    pub result: Option<serde_json::Value>,
}

/// Result of a conditional balance deduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: Decimal },
    Insufficient { balance: Decimal },
}
