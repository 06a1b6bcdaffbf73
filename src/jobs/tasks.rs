/// Background task implementations
use crate::{context::AppContext, error::ApiResult, metrics};

/// Drop counters for rate-limit windows that have ended
pub fn purge_rate_windows(ctx: &AppContext) -> usize {
    ctx.rate_limiter.purge_expired()
}

/// Health check - verify the ledger answers and refresh the uptime gauge
pub async fn health_check(ctx: &AppContext) -> ApiResult<()> {
    metrics::UPTIME_SECONDS.set(ctx.started_at.elapsed().as_secs_f64());
    ctx.ledger.ping().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, context::AppContext};

    #[tokio::test]
    async fn test_tasks_run_against_memory_ledger() {
        let ctx = AppContext::new(ServerConfig::local()).await.unwrap();
        ctx.rate_limiter
            .check_bucket(crate::rate_limit::Bucket::Tool, "203.0.113.7")
            .unwrap();

        assert!(health_check(&ctx).await.is_ok());
        // The window is still current, nothing to purge
        assert_eq!(purge_rate_windows(&ctx), 0);
    }
}
