use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::rate_window_purge_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Drop expired rate-limit windows (runs every minute)
    async fn rate_window_purge_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let started = Instant::now();

            let removed = tasks::purge_rate_windows(&scheduler.context);
            metrics::record_background_job("purge_rate_windows", "success", started.elapsed().as_secs_f64());
            if removed > 0 {
                debug!("Purged {} expired rate-limit windows", removed);
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    metrics::record_background_job("health_check", "success", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    metrics::record_background_job("health_check", "failure", started.elapsed().as_secs_f64());
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
