use crate::config::AppState;
use crate::middleware::auth;
use anyhow::Result;
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use toolhost_core::{FieldViolation, ToolError};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let invoke = Router::new()
        .route("/api/tools/{id}/invoke", post(handlers::invoke_tool))
        .route_layer(from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/service", get(handlers::get_service))
        .route("/api/tools", get(handlers::list_tools))
        .route("/api/tools/{id}", get(handlers::get_tool))
        .merge(invoke)
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "toolhost",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            violations: Vec::new(),
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(error)
        }
    }

    pub fn with_violations(error: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            violations,
            ..Self::new(error)
        }
    }
}

/// Custom error type for API handlers
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<ToolError>() {
            return match err {
                ToolError::InputValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if self.0.downcast_ref::<serde_json::Error>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_msg = self.0.to_string();

        let response = match self.0.downcast::<ToolError>() {
            Ok(ToolError::InputValidation { violations, .. }) => {
                ErrorResponse::with_violations(error_msg, violations)
            }
            Ok(_) => ErrorResponse::new(error_msg),
            Err(err) => {
                let details = err.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");
                if details.is_empty() {
                    ErrorResponse::new(error_msg)
                } else {
                    ErrorResponse::with_details(error_msg, details)
                }
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %response.error, "Request failed");
        }

        (status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use toolhost_core::{ServiceMetadata, ToolRegistry, ToolService};
    use toolhost_tools::{weather, UpstreamClient, UpstreamConfig};
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata() -> ServiceMetadata {
        ServiceMetadata {
            title: "Toolhost".to_string(),
            description: "Test service".to_string(),
            version: "1.0.0".to_string(),
            author: "Tests".to_string(),
            tags: vec!["weather".to_string()],
            logo: None,
        }
    }

    fn weather_service(base: &str) -> ToolService {
        let client = UpstreamClient::new(UpstreamConfig::default()).unwrap();
        let base = Url::parse(base).unwrap();
        let mut registry = ToolRegistry::new();
        registry.register_all(weather::tools(&client, &base).unwrap()).unwrap();
        ToolService::new(metadata(), registry)
    }

    fn router(service: ToolService) -> Router {
        create_router(AppState::from_service(service))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn invoke(id: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/tools/{}/invoke", id))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-caller-id", "agent-7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = send(router(weather_service("http://localhost")), get("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "toolhost");
    }

    #[tokio::test]
    async fn test_service_manifest() {
        let (status, body) = send(router(weather_service("http://localhost")), get("/api/service")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Toolhost");
        assert_eq!(body["tools"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_and_get_tools() {
        let app = router(weather_service("http://localhost"));

        let (status, body) = send(app.clone(), get("/api/tools")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "get-weather");
        assert!(body[0]["inputSchema"].is_object());
        assert_eq!(body[0]["pricing"]["pricePerUse"], 0.0);

        let (status, body) = send(app.clone(), get("/api/tools/get-weather-forecast")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "get-weather-forecast");

        let (status, body) = send(app, get("/api/tools/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_invoke_tool() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "40"))
            .and(query_param("longitude", "-75"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": { "temperature_2m": 21.5, "wind_speed_10m": 12.0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = router(weather_service(&server.uri()));
        let (status, body) = send(
            app,
            invoke("get-weather", json!({"latitude": 40.0, "longitude": -75.0})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["temperature"], 21.5);
        assert_eq!(body["data"]["windSpeed"], 12.0);
        assert_eq!(body["ui"]["type"], "card");
        assert!(body["ui"]["uiData"].is_string());
    }

    #[tokio::test]
    async fn test_invoke_invalid_input_is_422() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let app = router(weather_service(&server.uri()));
        let (status, body) = send(app, invoke("get-weather", json!({"latitude": 91.0}))).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body["violations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_404() {
        let app = router(weather_service("http://localhost"));
        let (status, _) = send(app, invoke("teleport", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invoke_malformed_body_is_400() {
        let app = router(weather_service("http://localhost"));
        let request = Request::builder()
            .method("POST")
            .uri("/api/tools/get-weather/invoke")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_200_with_failure_result() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let app = router(weather_service(&server.uri()));
        let (status, body) = send(
            app,
            invoke("get-weather", json!({"latitude": 1.0, "longitude": 2.0})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
        assert_eq!(body["ui"]["type"], "alert");
    }

    #[tokio::test]
    async fn test_api_key_required_for_invoke() {
        let service = weather_service("http://localhost").with_api_key("host-key");
        let app = router(service);

        let (status, _) = send(app.clone(), invoke("get-weather", json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Listing stays public
        let (status, _) = send(app.clone(), get("/api/tools")).await;
        assert_eq!(status, StatusCode::OK);

        let mut request = invoke("get-weather", json!({}));
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer host-kez".parse().unwrap(),
        );
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = invoke("get-weather", json!({}));
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer host-key".parse().unwrap(),
        );
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
