//! HTTP surface over the governance engine.

use crate::api::{AuditRequest, AuditResponse, ErrorBody, GovernanceEngine, PreCheckRequest, PreCheckResponse};
use crate::audit::{AuditQuery, AuditRecord};
use crate::{Error, Result};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Error returned by a handler, rendered with its wire code.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::parse(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::parse(rejection.body_text()))
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error.wire_code() {
        "audit_rejected" | "invalid_request" => StatusCode::BAD_REQUEST,
        "audit_unavailable" | "precheck_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ruleset_version: String,
    audit_backend: String,
    live_contexts: usize,
}

/// Build the router.
pub fn router(engine: Arc<GovernanceEngine>) -> Router {
    Router::new()
        .route("/api/policy/pre-check", post(pre_check))
        .route("/api/audit/llm-call", post(record_audit))
        .route("/api/audit/records", get(audit_records))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve the router on `addr` until `shutdown` resolves.
pub async fn serve<F>(engine: Arc<GovernanceEngine>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn pre_check(
    State(engine): State<Arc<GovernanceEngine>>,
    payload: std::result::Result<Json<PreCheckRequest>, JsonRejection>,
) -> std::result::Result<Json<PreCheckResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(engine.pre_check(&request)?))
}

async fn record_audit(
    State(engine): State<Arc<GovernanceEngine>>,
    payload: std::result::Result<Json<AuditRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<AuditResponse>), ApiError> {
    let Json(request) = payload?;
    let correlation_id = request.correlation_id.clone();

    match engine.record_audit(request).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            warn!(correlation_id = %correlation_id, reason = e.category(), error = %e, "Audit not recorded");
            Err(e.into())
        }
    }
}

async fn audit_records(
    State(engine): State<Arc<GovernanceEngine>>,
    query: std::result::Result<Query<AuditQuery>, QueryRejection>,
) -> std::result::Result<Json<Vec<AuditRecord>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(engine.audit_records(&query).await?))
}

async fn health(State(engine): State<Arc<GovernanceEngine>>) -> Json<HealthResponse> {
    let metrics = engine.metrics();
    Json(HealthResponse {
        status: "healthy",
        version: crate::VERSION,
        ruleset_version: metrics.ruleset_version,
        audit_backend: metrics.audit_backend,
        live_contexts: metrics.contexts.live,
    })
}

async fn metrics(State(engine): State<Arc<GovernanceEngine>>) -> Response {
    let Some(telemetry) = engine.telemetry() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match telemetry.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let engine = GovernanceEngine::builder()
            .with_audit_store(Arc::new(MemoryAuditStore::new()))
            .build()
            .await
            .unwrap();
        router(Arc::new(engine))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn audit_body(correlation_id: &str) -> Value {
        json!({
            "correlation_id": correlation_id,
            "response_summary": "Paris is the capital.",
            "provider": "openai",
            "model": "gpt-3.5-turbo",
            "usage": {"prompt_tokens": 20, "completion_tokens": 30, "total_tokens": 50},
            "latency_ms": 420
        })
    }

    #[tokio::test]
    async fn test_pre_check_and_audit_routes() {
        let app = app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/policy/pre-check",
            Some(json!({"requester_id": "user-1", "query": "What is the capital of France?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approved"], json!(true));
        let id = body["correlation_id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "POST", "/api/audit/llm-call", Some(audit_body(&id))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], json!(true));
        assert!(!body["audit_id"].as_str().unwrap().is_empty());

        let (status, body) = send(&app, "GET", "/api/audit/records?tenant_id=default", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_pre_check_is_ok() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/policy/pre-check",
            Some(json!({"requester_id": "u", "query": "Process refund for customer with SSN 123-45-6789"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approved"], json!(false));
        assert_eq!(body["findings"][0]["category"], json!("social-security-number"));
        assert_eq!(body["findings"][0]["redacted"], json!("***-**-6789"));
        assert!(!body.to_string().contains("123-45-6789"));
    }

    #[tokio::test]
    async fn test_rejections_are_masked() {
        let app = app().await;
        let (status, unknown) = send(&app, "POST", "/api/audit/llm-call", Some(audit_body("nope"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(unknown["error"], json!("audit_rejected"));
        assert_eq!(unknown["message"], json!("audit rejected"));
        assert_eq!(unknown["success"], json!(false));
    }

    #[tokio::test]
    async fn test_full_context_store_is_unavailable() {
        let mut config = crate::Config::default();
        config.context.max_entries = 1;
        let engine = GovernanceEngine::builder()
            .with_config(config)
            .with_audit_store(Arc::new(MemoryAuditStore::new()))
            .build()
            .await
            .unwrap();
        let app = router(Arc::new(engine));
        let body = json!({"requester_id": "u", "query": "What is the capital of France?"});

        let (status, _) = send(&app, "POST", "/api/policy/pre-check", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, error) = send(&app, "POST", "/api/policy/pre-check", Some(body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error["error"], json!("precheck_unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_bodies() {
        let app = app().await;
        let (status, body) = send(&app, "POST", "/api/policy/pre-check", Some(json!({"query": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid_request"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/policy/pre-check",
            Some(json!({"requester_id": "u", "query": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid_request"));
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));

        send(
            &app,
            "POST",
            "/api/policy/pre-check",
            Some(json!({"requester_id": "u", "query": "hi"})),
        )
        .await;

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("governance_precheck_total{decision=\"approved\"} 1"));
    }
}
