//! JSON HTTP surface over the registry and invocation engine.

use crate::error::GatewayError;
use crate::invocation::InvocationEngine;
use crate::mcp::{result_to_mcp, tool_to_mcp};
use crate::model::{ToolCall, ToolError};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InvocationEngine>,
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/tools", get(list_tools))
        .route("/v1/tools/call", post(call_tool))
        .route("/v1/tools/validate", post(validate_call))
        .route("/v1/tools/{name}", get(get_tool))
        .route("/v1/executions", get(list_executions))
        .route("/v1/executions/{call_id}/cancel", post(cancel_execution))
        .route("/v1/stats", get(list_stats))
        .route("/v1/stats/{tool}", get(get_stats))
        .route("/v1/configs/{id}/invalidate", post(invalidate_config))
}

fn error_response(e: &GatewayError) -> Response {
    let status = match e {
        GatewayError::ToolNotFound(_) | GatewayError::ConfigurationNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        GatewayError::Parse(_) | GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
        GatewayError::ToolAlreadyExists(_) => StatusCode::CONFLICT,
        GatewayError::Persistence(_) | GatewayError::CircuitOpen { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": ToolError::from(e) }))).into_response()
}

async fn health(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "tools": state.engine.registry().count(),
        "activeExecutions": state.engine.get_active_executions().len(),
    }))
}

#[derive(Debug, Deserialize)]
struct ListToolsQuery {
    /// Case-insensitive name regex.
    pattern: Option<String>,
}

async fn list_tools(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<ListToolsQuery>,
) -> Response {
    let registry = state.engine.registry();
    let tools = match q.pattern.as_deref() {
        Some(p) => match registry.find_by_name_pattern(p) {
            Ok(t) => t,
            Err(e) => return error_response(&e),
        },
        None => registry.get_all_tools(),
    };
    let tools: Vec<_> = tools.iter().map(tool_to_mcp).collect();
    Json(json!({ "tools": tools })).into_response()
}

async fn get_tool(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.engine.registry().get_tool(&name).await {
        Ok(tool) => Json(tool).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct CallQuery {
    /// `mcp` returns an MCP `CallToolResult` instead of the native result.
    format: Option<String>,
}

async fn call_tool(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<CallQuery>,
    Json(call): Json<ToolCall>,
) -> Response {
    let result = state.engine.invoke(call).await;
    if q.format.as_deref() == Some("mcp") {
        return Json(result_to_mcp(&result)).into_response();
    }
    Json(result).into_response()
}

async fn validate_call(
    Extension(state): Extension<Arc<AppState>>,
    Json(call): Json<ToolCall>,
) -> impl IntoResponse {
    Json(state.engine.validate(&call).await)
}

async fn list_executions(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "executions": state.engine.get_active_executions() }))
}

async fn cancel_execution(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Response {
    if state.engine.cancel(&call_id) {
        return Json(json!({ "cancelled": true })).into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "cancelled": false, "callId": call_id })),
    )
        .into_response()
}

async fn list_stats(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "stats": state.engine.get_all_stats().await }))
}

async fn get_stats(
    Extension(state): Extension<Arc<AppState>>,
    Path(tool): Path<String>,
) -> Response {
    match state.engine.get_stats(&tool).await {
        Some(stats) => Json(stats).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no stats for tool '{tool}'") })),
        )
            .into_response(),
    }
}

async fn invalidate_config(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.engine.resolver().invalidate(&id);
    StatusCode::NO_CONTENT
}
