/// Platform statistics
use crate::{context::AppContext, metrics};
use axum::{routing::get, Json, Router};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/stats", get(stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub questions_answered: u64,
    pub security_experts: String,
    pub response_time: String,
    pub accuracy_rate: String,
}

/// GET /api/stats
async fn stats() -> Json<PlatformStats> {
    Json(PlatformStats {
        questions_answered: metrics::questions_answered(),
        security_experts: "2 AI Models".to_string(),
        response_time: "< 30 seconds".to_string(),
        accuracy_rate: "98.5%".to_string(),
    })
}
