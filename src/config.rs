/// Configuration management for CyberGuard
use crate::error::{ApiError, ApiResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub ledger: LedgerConfig,
    pub billing: BillingConfig,
    pub rate_limit: RateLimitConfig,
    pub advisor: AdvisorConfig,
    pub payments: PaymentsConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Which ledger backend holds accounts, sessions, messages and tool usage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerConfig {
    Memory,
    Sqlite { path: PathBuf },
}

/// What happens to the price of an account's first consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeTrialPolicy {
    /// The first question is billed like any other; the flag only records it
    Charge,
    /// The first question costs nothing
    Waive,
}

impl FromStr for FreeTrialPolicy {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "charge" => Ok(FreeTrialPolicy::Charge),
            "waive" => Ok(FreeTrialPolicy::Waive),
            other => Err(ApiError::Validation(format!("Invalid free trial policy: {}", other))),
        }
    }
}

/// Consultation pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub consultation_price: Decimal,
    pub free_trial: FreeTrialPolicy,
    pub currency: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub consultation: BucketQuota,
    pub tool: BucketQuota,
    /// Per-address request rate across every route
    pub global_requests_per_second: u32,
    pub global_burst: u32,
}

/// Fixed-window quota for one bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketQuota {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// External AI collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    pub perplexity_api_key: Option<String>,
    pub perplexity_url: String,
    pub perplexity_model: String,
    pub openai_api_key: Option<String>,
    pub openai_url: String,
    pub openai_model: String,
    pub request_timeout_secs: u64,
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_api_url: String,
    pub request_timeout_secs: u64,
}

/// Admin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token allowed to grant credits; admin routes are disabled without it
    pub token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = var_or("CG_HOSTNAME", "0.0.0.0");
        let port = var_or("CG_PORT", "5000")
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let version = var_or("CG_VERSION", env!("CARGO_PKG_VERSION"));

        let ledger = match var_or("CG_LEDGER_BACKEND", "memory").to_lowercase().as_str() {
            "memory" => LedgerConfig::Memory,
            "sqlite" => LedgerConfig::Sqlite {
                path: var_or("CG_LEDGER_SQLITE_PATH", "./data/ledger.sqlite").into(),
            },
            other => {
                return Err(ApiError::Validation(format!("Unknown ledger backend: {}", other)))
            }
        };

        let consultation_price = Decimal::from_str(&var_or("CONSULT_PRICE", "5.00"))
            .map_err(|e| ApiError::Validation(format!("Invalid CONSULT_PRICE: {}", e)))?;
        let free_trial = var_or("CONSULT_FREE_TRIAL_POLICY", "charge").parse()?;
        let currency = var_or("CG_CURRENCY", "usd");

        let rate_limit = RateLimitConfig {
            enabled: var_or("CG_RATE_LIMITS_ENABLED", "true").parse().unwrap_or(true),
            consultation: BucketQuota {
                max_requests: var_or("CG_RATE_LIMIT_CONSULTATION_MAX", "10").parse().unwrap_or(10),
                window_secs: var_or("CG_RATE_LIMIT_CONSULTATION_WINDOW_SECS", "900")
                    .parse()
                    .unwrap_or(900),
            },
            tool: BucketQuota {
                max_requests: var_or("CG_RATE_LIMIT_TOOL_MAX", "50").parse().unwrap_or(50),
                window_secs: var_or("CG_RATE_LIMIT_TOOL_WINDOW_SECS", "300")
                    .parse()
                    .unwrap_or(300),
            },
            global_requests_per_second: var_or("CG_RATE_LIMIT_GLOBAL_RPS", "20")
                .parse()
                .unwrap_or(20),
            global_burst: var_or("CG_RATE_LIMIT_GLOBAL_BURST", "60").parse().unwrap_or(60),
        };

        let advisor = AdvisorConfig {
            perplexity_api_key: non_empty("PERPLEXITY_API_KEY"),
            perplexity_url: var_or(
                "PERPLEXITY_API_URL",
                "https://api.perplexity.ai/chat/completions",
            ),
            perplexity_model: var_or("PERPLEXITY_MODEL", "llama-3.1-sonar-small-128k-online"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_url: var_or("OPENAI_API_URL", "https://api.openai.com/v1/chat/completions"),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o"),
            request_timeout_secs: var_or("CG_ADVISOR_TIMEOUT_SECS", "30").parse().unwrap_or(30),
        };

        let payments = PaymentsConfig {
            stripe_secret_key: non_empty("STRIPE_SECRET_KEY"),
            stripe_api_url: var_or("STRIPE_API_URL", "https://api.stripe.com/v1"),
            request_timeout_secs: var_or("CG_PAYMENTS_TIMEOUT_SECS", "15").parse().unwrap_or(15),
        };

        let admin = AdminConfig {
            token: non_empty("CG_ADMIN_TOKEN"),
        };

        let logging = LoggingConfig {
            level: var_or("RUST_LOG", "info"),
            json: var_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            ledger,
            billing: BillingConfig {
                consultation_price,
                free_trial,
                currency,
            },
            rate_limit,
            advisor,
            payments,
            admin,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.billing.consultation_price <= Decimal::ZERO {
            return Err(ApiError::Validation(
                "Consultation price must be positive".to_string(),
            ));
        }

        if self.billing.consultation_price.round_dp(2) != self.billing.consultation_price {
            return Err(ApiError::Validation(
                "Consultation price must be in whole cents".to_string(),
            ));
        }

        for (name, quota) in [
            ("consultation", &self.rate_limit.consultation),
            ("tool", &self.rate_limit.tool),
        ] {
            if quota.max_requests == 0 || quota.window_secs == 0 {
                return Err(ApiError::Validation(format!(
                    "Rate limit for {} needs a non-zero quota and window",
                    name
                )));
            }
        }

        if let Some(token) = &self.admin.token {
            if token.len() < 16 {
                return Err(ApiError::Validation(
                    "Admin token must be at least 16 characters".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Defaults used by tests and local development
    pub fn local() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 5000,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            ledger: LedgerConfig::Memory,
            billing: BillingConfig {
                consultation_price: Decimal::new(500, 2),
                free_trial: FreeTrialPolicy::Charge,
                currency: "usd".to_string(),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                consultation: BucketQuota {
                    max_requests: 10,
                    window_secs: 900,
                },
                tool: BucketQuota {
                    max_requests: 50,
                    window_secs: 300,
                },
                global_requests_per_second: 1000,
                global_burst: 1000,
            },
            advisor: AdvisorConfig {
                perplexity_api_key: None,
                perplexity_url: "https://api.perplexity.ai/chat/completions".to_string(),
                perplexity_model: "llama-3.1-sonar-small-128k-online".to_string(),
                openai_api_key: None,
                openai_url: "https://api.openai.com/v1/chat/completions".to_string(),
                openai_model: "gpt-4o".to_string(),
                request_timeout_secs: 30,
            },
            payments: PaymentsConfig {
                stripe_secret_key: None,
                stripe_api_url: "https://api.stripe.com/v1".to_string(),
                request_timeout_secs: 15,
            },
            admin: AdminConfig { token: None },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_is_valid() {
        assert!(ServerConfig::local().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let mut config = ServerConfig::local();
        config.billing.consultation_price = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_sub_cent_price() {
        let mut config = ServerConfig::local();
        config.billing.consultation_price = Decimal::new(4999, 3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = ServerConfig::local();
        config.rate_limit.tool.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_admin_token() {
        let mut config = ServerConfig::local();
        config.admin.token = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_free_trial_policy_parsing() {
        assert_eq!("charge".parse::<FreeTrialPolicy>().unwrap(), FreeTrialPolicy::Charge);
        assert_eq!(" WAIVE ".parse::<FreeTrialPolicy>().unwrap(), FreeTrialPolicy::Waive);
        assert!("sometimes".parse::<FreeTrialPolicy>().is_err());
    }
}
