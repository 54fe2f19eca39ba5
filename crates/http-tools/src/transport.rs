//! Outbound HTTP transport.
//!
//! The invocation engine and the override resolver only talk to [`HttpTransport`]. The default
//! implementation is [`ReqwestTransport`]; tests substitute scripted transports.

use crate::method::HttpMethod;
use crate::safety::{OutboundPolicy, redact_url, sanitize_reqwest_error};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("outbound HTTP blocked: {0}")]
    Blocked(String),
    #[error("response too large: {0}")]
    TooLarge(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("http transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Errors worth retrying: the request may succeed when repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connect(_))
    }
}

/// A fully built outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// JSON body; only sent when present.
    pub body: Option<Value>,
    /// `None` disables the per-request timeout.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and return whatever status the upstream answered with.
    ///
    /// Non-2xx responses are **not** errors at this layer.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response could be obtained.
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

/// `reqwest`-backed transport that enforces an [`OutboundPolicy`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    policy: OutboundPolicy,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(policy: OutboundPolicy) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(policy.redirect_policy())
            .build()
            .map_err(|e| TransportError::Other(sanitize_reqwest_error(&e)))?;
        Ok(Self { client, policy })
    }

    #[must_use]
    pub fn policy(&self) -> &OutboundPolicy {
        &self.policy
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        self.policy.check_destination(&request.url).await?;

        let timeout = request.timeout;
        tracing::debug!(method = %request.method, url = %redact_url(&request.url), "outbound request");
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;
        let status = response.status().as_u16();
        tracing::debug!(status, "outbound response");
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body =
            read_response_body_limited_bytes(response, self.policy.max_response_bytes, timeout)
                .await?;

        Ok(OutboundResponse {
            status,
            content_type,
            body,
        })
    }
}

fn map_reqwest_error(e: &reqwest::Error, timeout: Option<Duration>) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout(timeout.unwrap_or_default());
    }
    if e.is_connect() {
        return TransportError::Connect(sanitize_reqwest_error(e));
    }
    if e.is_redirect() {
        return TransportError::Blocked(sanitize_reqwest_error(e));
    }
    if e.is_builder() {
        return TransportError::InvalidRequest(sanitize_reqwest_error(e));
    }
    TransportError::Other(sanitize_reqwest_error(e))
}

async fn read_response_body_limited_bytes(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, TransportError> {
    let Some(max) = max_bytes else {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(TransportError::TooLarge(format!(
            "{len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_reqwest_error(&e, timeout))?
    {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(TransportError::TooLarge(format!("exceeded {max} bytes")));
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::{get, post};
    use serde_json::json;
    use unrelated_test_support::{RequestLog, TestServer};

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(OutboundPolicy::unrestricted()).expect("client")
    }

    #[tokio::test]
    async fn sends_headers_and_json_body() {
        let log = RequestLog::default();
        let server = TestServer::echo(log.clone()).await.expect("server");

        let mut req = OutboundRequest::new(
            HttpMethod::Post,
            Url::parse(&server.url("/pets?limit=5")).unwrap(),
        );
        req.headers
            .push(("Authorization".to_string(), "Bearer t0k".to_string()));
        req.body = Some(json!({"name": "rex"}));
        req.timeout = Some(Duration::from_secs(5));

        let resp = transport().send(req).await.expect("send");
        assert!(resp.is_success());
        assert!(
            resp.content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("application/json"))
        );

        let seen = log.last().expect("recorded");
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.path, "/pets");
        assert_eq!(seen.query.as_deref(), Some("limit=5"));
        assert_eq!(seen.header("authorization"), Some("Bearer t0k"));
        let body: Value = serde_json::from_slice(&seen.body).unwrap();
        assert_eq!(body, json!({"name": "rex"}));
    }

    #[tokio::test]
    async fn non_success_status_is_not_a_transport_error() {
        let app = Router::new().route(
            "/boom",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let server = TestServer::spawn(app).await.expect("server");

        let req = OutboundRequest::new(HttpMethod::Post, Url::parse(&server.url("/boom")).unwrap());
        let resp = transport().send(req).await.expect("send");
        assert_eq!(resp.status, 503);
        assert_eq!(resp.text_lossy(), "down");
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let server = TestServer::spawn(app).await.expect("server");

        let mut req =
            OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/slow")).unwrap());
        req.timeout = Some(Duration::from_millis(100));
        let err = transport().send(req).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "{err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn response_limit_is_enforced() {
        let app = Router::new().route("/big", get(|| async { "x".repeat(4096) }));
        let server = TestServer::spawn(app).await.expect("server");

        let policy = OutboundPolicy {
            max_response_bytes: Some(1024),
            ..OutboundPolicy::unrestricted()
        };
        let transport = ReqwestTransport::new(policy).expect("client");

        let req = OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/big")).unwrap());
        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge(_)), "{err:?}");
    }

    #[tokio::test]
    async fn default_policy_blocks_before_sending() {
        let log = RequestLog::default();
        let server = TestServer::echo(log.clone()).await.expect("server");
        let transport = ReqwestTransport::new(OutboundPolicy::default()).expect("client");

        let req = OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/")).unwrap());
        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, TransportError::Blocked(_)));
        assert!(log.is_empty());
    }

    async fn redirecting_server(target: String) -> TestServer {
        let app = Router::new().route(
            "/start",
            get(move || async move { axum::response::Redirect::temporary(&target) }),
        );
        TestServer::spawn(app).await.expect("server")
    }

    #[tokio::test]
    async fn redirect_hops_are_checked_against_the_allow_list() {
        let log = RequestLog::default();
        let target = TestServer::echo(log.clone()).await.expect("server");
        let target_url = format!("http://localhost:{}/target", target.addr().port());
        let server = redirecting_server(target_url).await;

        let transport =
            ReqwestTransport::new(OutboundPolicy::unrestricted().with_allowed_hosts(["127.0.0.1"]))
                .expect("client");
        let req = OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/start")).unwrap());
        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, TransportError::Blocked(_)), "{err:?}");
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn allowed_redirects_are_followed() {
        let log = RequestLog::default();
        let target = TestServer::echo(log.clone()).await.expect("server");
        let server = redirecting_server(target.url("/target")).await;

        let req = OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/start")).unwrap());
        let resp = transport().send(req).await.expect("send");
        assert_eq!(resp.status, 200);
        assert_eq!(log.last().expect("recorded").path, "/target");
    }

    #[tokio::test]
    async fn without_redirect_budget_the_3xx_is_returned() {
        let log = RequestLog::default();
        let target = TestServer::echo(log.clone()).await.expect("server");
        let server = redirecting_server(target.url("/target")).await;

        let policy = OutboundPolicy {
            max_redirects: 0,
            ..OutboundPolicy::unrestricted()
        };
        let transport = ReqwestTransport::new(policy).expect("client");
        let req = OutboundRequest::new(HttpMethod::Get, Url::parse(&server.url("/start")).unwrap());
        let resp = transport.send(req).await.expect("send");
        assert_eq!(resp.status, 307);
        assert!(log.is_empty());
    }
}
