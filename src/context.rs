/// Application context and dependency injection
use crate::{
    advisor::{AnalysisProvider, GuidanceProvider, OpenAiClient, PerplexityClient},
    billing::{self, CreditGate, PaymentGateway},
    config::ServerConfig,
    consultation::ConsultationService,
    error::ApiResult,
    identity::IdentityResolver,
    ledger::{self, LedgerStore},
    rate_limit::RateLimiter,
    tools::{ToolService, WebInspector},
};
use std::{sync::Arc, time::Instant};

/// External services the core talks to; swapped for doubles in tests
#[derive(Clone)]
pub struct Collaborators {
    pub guidance: Arc<dyn GuidanceProvider>,
    pub analysis: Arc<dyn AnalysisProvider>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl Collaborators {
    /// Real clients built from configuration
    pub fn from_config(config: &ServerConfig) -> ApiResult<Self> {
        Ok(Self {
            guidance: Arc::new(PerplexityClient::new(&config.advisor)?),
            analysis: Arc::new(OpenAiClient::new(&config.advisor)?),
            payments: billing::payment_gateway(&config.payments)?,
        })
    }
}

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub ledger: Arc<dyn LedgerStore>,
    pub identity: Arc<IdentityResolver>,
    pub consultations: Arc<ConsultationService>,
    pub tools: Arc<ToolService>,
    pub payments: Arc<dyn PaymentGateway>,
    // Rate limiter
    pub rate_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        let ledger = ledger::open(&config.ledger).await?;
        ledger.ping().await?;

        let collaborators = Collaborators::from_config(&config)?;
        Self::assemble(config, ledger, collaborators)
    }

    /// Wire services around an already opened ledger and collaborators
    pub fn assemble(
        config: ServerConfig,
        ledger: Arc<dyn LedgerStore>,
        collaborators: Collaborators,
    ) -> ApiResult<Self> {
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        let gate = CreditGate::new(
            ledger.clone(),
            config.billing.consultation_price,
            config.billing.free_trial,
        );

        let consultations = Arc::new(ConsultationService::new(
            ledger.clone(),
            gate,
            rate_limiter.clone(),
            collaborators.guidance,
            collaborators.analysis,
        ));

        let tools = Arc::new(ToolService::new(
            ledger.clone(),
            rate_limiter.clone(),
            WebInspector::new()?,
        ));

        tracing::info!(
            ledger = ledger.backend(),
            price = %config.billing.consultation_price,
            free_trial = ?config.billing.free_trial,
            payments = collaborators.payments.is_configured(),
            "Application context ready"
        );

        Ok(Self {
            identity: Arc::new(IdentityResolver::new(ledger.clone())),
            config: Arc::new(config),
            ledger,
            consultations,
            tools,
            payments: collaborators.payments,
            rate_limiter,
            started_at: Instant::now(),
        })
    }

    /// Base URL this service is reachable at
    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.config.service.hostname, self.config.service.port)
    }
}
