/// Caller-scoped account endpoints
use crate::{
    api::{middleware::session_cookie, ProfileResponse},
    auth::ClientContext,
    context::AppContext,
    error::ApiResult,
    ledger::{ChatSession, ToolUsageRecord},
};
use axum::{extract::State, routing::get, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/user/profile", get(profile))
        .route("/api/user/sessions", get(sessions))
        .route("/api/user/tool-usage", get(tool_usage))
}

/// GET /api/user/profile - always resolves, creating the account if needed
async fn profile(
    State(ctx): State<AppContext>,
    client: ClientContext,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<ProfileResponse>)> {
    let account = ctx.identity.resolve(&client.identity).await?;
    let jar = jar.add(session_cookie(&account.session_token));
    Ok((jar, Json(ProfileResponse::from(&account))))
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<ChatSession>,
}

/// GET /api/user/sessions
async fn sessions(
    State(ctx): State<AppContext>,
    client: ClientContext,
) -> ApiResult<Json<SessionsResponse>> {
    let sessions = match ctx.identity.lookup(&client.identity).await? {
        Some(account) => ctx.ledger.list_account_sessions(account.id).await?,
        None => Vec::new(),
    };
    Ok(Json(SessionsResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct ToolUsageResponse {
    pub usage: Vec<ToolUsageRecord>,
}

/// GET /api/user/tool-usage
async fn tool_usage(
    State(ctx): State<AppContext>,
    client: ClientContext,
) -> ApiResult<Json<ToolUsageResponse>> {
    let usage = match ctx.identity.lookup(&client.identity).await? {
        Some(account) => ctx.ledger.account_tool_usage(account.id).await?,
        None => Vec::new(),
    };
    Ok(Json(ToolUsageResponse { usage }))
}
