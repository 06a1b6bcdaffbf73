/// Consultation and chat history endpoints
use crate::{
    api::middleware::{session_cookie, JsonBody},
    auth::ClientContext,
    consultation::ConsultationRequest,
    context::AppContext,
    error::{ApiError, ApiResult},
    ledger::ChatMessage,
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/consultation", post(consult))
        .route("/api/chat-history/:session_id", get(chat_history))
}

/// POST /api/consultation
async fn consult(
    State(ctx): State<AppContext>,
    client: ClientContext,
    jar: CookieJar,
    JsonBody(request): JsonBody<ConsultationRequest>,
) -> Response {
    // Body fingerprint wins over the header hint
    let identity = match request.fingerprint.clone() {
        Some(fingerprint) => client.identity.with_fingerprint(Some(fingerprint)),
        None => client.identity,
    };

    let outcome = ctx.consultations.consult(&identity, request).await;

    let jar = match &outcome.account {
        Some(account) => jar.add(session_cookie(&account.session_token)),
        None => jar,
    };

    (jar, outcome.result.map(Json)).into_response()
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessage>,
}

/// GET /api/chat-history/:session_id
async fn chat_history(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ChatHistoryResponse>> {
    let session = ctx
        .ledger
        .get_session_by_token(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    let messages = ctx.ledger.session_messages(session.id).await?;
    Ok(Json(ChatHistoryResponse { messages }))
}
