/// Security tool endpoints
use crate::{
    auth::ClientContext,
    context::AppContext,
    error::ApiResult,
    ledger::ToolName,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/tools/:tool_name", post(invoke_tool))
}

/// POST /api/tools/:tool_name
async fn invoke_tool(
    State(ctx): State<AppContext>,
    Path(tool_name): Path<String>,
    client: ClientContext,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let tool: ToolName = tool_name.parse()?;
    // An unreadable body is treated like one missing the required field
    let body = body.map(|Json(value)| value).unwrap_or(Value::Null);

    let result = ctx.tools.invoke(tool, &client.identity, &body).await?;
    Ok(Json(result))
}
