/// CyberGuard - pay-per-question AI cybersecurity consultant
///
/// Credit, session and rate-limit bookkeeping around the consultation
/// endpoint, plus the free security tools and payment hooks.

mod advisor;
mod api;
mod auth;
mod billing;
mod config;
mod consultation;
mod context;
mod error;
mod identity;
mod jobs;
mod ledger;
mod metrics;
mod rate_limit;
mod server;
mod tools;

use config::ServerConfig;
use context::AppContext;
use error::ApiResult;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration (also reads .env)
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cyberguard=debug,tower_http=debug".into()),
        )
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    print_banner();

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______      __              ______                     __
  / ____/_  __/ /_  ___  _____/ ____/_  ______ __________/ /
 / /   / / / / __ \/ _ \/ ___/ / __/ / / / __ `/ ___/ __  /
/ /___/ /_/ / /_/ /  __/ /  / /_/ / /_/ / /_/ / /  / /_/ /
\____/\__, /_.___/\___/_/   \____/\__,_/\__,_/_/   \__,_/
     /____/
        AI Cybersecurity Consultant v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
