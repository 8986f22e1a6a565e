use super::ApiResult;
use crate::config::AppState;
use crate::middleware::auth::caller_from_headers;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use toolhost_core::{ServiceManifest, ToolDescriptor, ToolError, ToolResult};

/// Service metadata and tool listing
pub async fn get_service(State(state): State<Arc<AppState>>) -> Json<ServiceManifest> {
    Json(state.service.manifest())
}

/// List all tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolDescriptor>> {
    Json(state.service.registry().list())
}

/// Get a specific tool
pub async fn get_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ToolDescriptor>> {
    let tool = state
        .service
        .registry()
        .get(&id)
        .ok_or(ToolError::NotFound(id))?;

    Ok(Json(tool.descriptor()))
}

/// Invoke a tool. An empty body is treated as `{}`.
pub async fn invoke_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ToolResult>> {
    let input: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)?
    };

    let caller = caller_from_headers(&headers);
    let result = state.service.invoke(&id, input, caller).await?;

    Ok(Json(result))
}
