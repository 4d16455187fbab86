//! HTTP client for workflows calling a remote governance gateway.

use crate::api::{AuditRequest, AuditResponse, ErrorBody, PreCheckRequest, PreCheckResponse};
use crate::audit::{AuditQuery, AuditRecord};
use crate::{Error, Result};

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::warn;

const SERVICE: &str = "governance-gateway";

/// Client for the gateway's HTTP surface.
#[derive(Debug, Clone)]
pub struct GovernanceClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GovernanceClient {
    /// Create a new client.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("llm-governance-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::integration(SERVICE, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pre-check a request.
    pub async fn pre_check(&self, request: &PreCheckRequest) -> Result<PreCheckResponse> {
        self.post("/api/policy/pre-check", request).await
    }

    /// Record the audit of a completed provider call.
    pub async fn record_audit(&self, request: &AuditRequest) -> Result<AuditResponse> {
        self.post("/api/audit/llm-call", request).await
    }

    /// Record an audit without failing the caller's workflow.
    ///
    /// Failures are logged at warn level and reported as `None`.
    pub async fn record_audit_non_fatal(&self, request: &AuditRequest) -> Option<AuditResponse> {
        match self.record_audit(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    error = %e,
                    "Audit logging failed; continuing without an audit record"
                );
                None
            }
        }
    }

    /// Retrieve audit records of a tenant.
    pub async fn audit_records(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let url = format!("{}/api/audit/records", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        decode(response).await
    }

    /// Check if the gateway is healthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        decode(response).await
    }
}

fn request_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("Request to {} timed out", SERVICE), timeout.as_millis() as u64)
    } else {
        Error::integration(SERVICE, format!("Request failed: {}", e))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| Error::integration(SERVICE, format!("Failed to parse response: {}", e)));
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error, body.message),
        Err(_) => ("http_error".to_string(), text),
    };
    Err(Error::Remote {
        status: status.as_u16(),
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{CallReport, TokenUsage};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn audit_request() -> AuditRequest {
        AuditRequest::new(
            "abc",
            CallReport::new("Paris.", "openai", "gpt-4o", TokenUsage::new(1, 2), 10),
        )
    }

    #[tokio::test]
    async fn test_pre_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/policy/pre-check"))
            .and(body_partial_json(json!({"requester_id": "user-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "correlation_id": "abc",
                "approved": true,
                "matched_policies": [],
                "findings": [],
                "expires_at": "2030-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GovernanceClient::new(server.uri(), Duration::from_secs(2)).unwrap();
        let response = client
            .pre_check(&PreCheckRequest::new("user-1", "hello"))
            .await
            .unwrap();
        assert!(response.approved);
        assert_eq!(response.correlation_id, "abc");
    }

    #[tokio::test]
    async fn test_rejection_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/audit/llm-call"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "error": "audit_rejected",
                "message": "audit rejected"
            })))
            .mount(&server)
            .await;

        let client = GovernanceClient::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = client.record_audit(&audit_request()).await.unwrap_err();
        match err {
            Error::Remote { status, ref code, .. } => {
                assert_eq!(status, 400);
                assert_eq!(code, "audit_rejected");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(client.record_audit_non_fatal(&audit_request()).await.is_none());
    }

    #[tokio::test]
    async fn test_record_audit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/audit/llm-call"))
            .and(body_partial_json(json!({"correlation_id": "abc", "provider": "openai"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "audit_id": "audit-1",
                "correlation_id": "abc",
                "estimated_cost_usd": 0.000015,
                "persisted_at": "2030-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = GovernanceClient::new(format!("{}/", server.uri()), Duration::from_secs(2)).unwrap();
        let response = client.record_audit_non_fatal(&audit_request()).await.unwrap();
        assert_eq!(response.audit_id, "audit-1");
    }

    #[tokio::test]
    async fn test_audit_records_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/audit/records"))
            .and(query_param("tenant_id", "acme"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = GovernanceClient::new(server.uri(), Duration::from_secs(2)).unwrap();
        let records = client
            .audit_records(&AuditQuery::tenant("acme").with_limit(5))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        let client = GovernanceClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(!client.health_check().await);
        let err = client
            .pre_check(&PreCheckRequest::new("u", "q"))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
