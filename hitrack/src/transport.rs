//! One-shot HTTP exchange with the HITrack API.
//!
//! [`Transport`] is the seam between the authentication protocol in [`crate::client`] and the
//! wire. It sends exactly what it is given (no credentials are added, nothing is retried) and
//! hands back the status and raw body, whatever the status is.

use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{self, HeaderMap, HeaderValue};
pub use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An outbound API call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL, eg `images/` or `auth/token/refresh/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    /// Set once the request has been replayed after a token refresh; a retried request is never
    /// retried again.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        ApiRequest {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query.extend(query);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces any existing authorization header with `Bearer <token>`
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Jwt(format!("token is not a valid header value: {e}")))?;
        auth_value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, auth_value);
        Ok(())
    }

    /// The bearer token currently attached, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        ApiResponse { status, body }
    }

    pub fn from_json(status: StatusCode, body: &Value) -> Self {
        ApiResponse {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parsed body, or `None` for an empty body
    pub fn value(&self) -> Result<Option<Value>> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            Ok(None)
        } else {
            Ok(Some(self.json()?))
        }
    }

    /// Human-readable error message from the body, if the server sent one.
    ///
    /// The API is inconsistent: auth endpoints and DRF itself use `detail`, custom actions use
    /// `error`, and some clients expect `message`.
    pub fn message(&self) -> Option<String> {
        let val: Value = serde_json::from_slice(&self.body).ok()?;
        ["message", "error", "detail"]
            .iter()
            .find_map(|k| val[*k].as_str().map(|s| s.to_string()))
    }

    pub fn into_error(self, fallback: &str) -> Error {
        Error::Api {
            status: self.status.as_u16(),
            message: self.message().unwrap_or_else(|| fallback.to_string()),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Production transport over a pooled async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(ReqwestTransport {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        debug!(
            "HTTP {} endpoint={} query={:?} retried={}",
            request.method, request.path, request.query, request.retried
        );
        let mut req = self
            .http_client
            .request(
                request.method.clone(),
                format!("{}/{}", self.base_url, request.path),
            )
            .headers(request.headers.clone())
            .query(&request.query);
        req = if let Some(b) = &request.body {
            req.json(b)
        } else {
            req
        };
        let res = req.send().await?;
        let status = res.status();
        let body = res.bytes().await?.to_vec();
        debug!("HTTP {} endpoint={} status={}", request.method, request.path, status);
        Ok(ApiResponse::new(status, body))
    }
}

#[test]
fn test_request_bearer() {
    let mut req = ApiRequest::get("/images/");
    assert_eq!(req.path, "images/");
    assert_eq!(req.bearer(), None);
    req.set_bearer("abc.def.ghi").unwrap();
    assert_eq!(req.bearer(), Some("abc.def.ghi"));
    assert!(req.headers[header::AUTHORIZATION].is_sensitive());
    req.set_bearer("second").unwrap();
    assert_eq!(req.headers.get_all(header::AUTHORIZATION).iter().count(), 1);
    assert!(req.set_bearer("bad\ntoken").is_err());
}

#[test]
fn test_response_message() {
    use serde_json::json;
    let res = ApiResponse::from_json(
        StatusCode::UNAUTHORIZED,
        &json!({"detail": "No active account found with the given credentials"}),
    );
    assert_eq!(
        res.message().as_deref(),
        Some("No active account found with the given credentials")
    );
    let res = ApiResponse::from_json(
        StatusCode::CONFLICT,
        &json!({"error": "Repository is already being scanned", "message": "busy"}),
    );
    assert_eq!(res.message().as_deref(), Some("busy"));
    let res = ApiResponse::new(StatusCode::BAD_GATEWAY, b"<html>".to_vec());
    assert_eq!(res.message(), None);
    assert_eq!(
        res.into_error("An error occurred").to_string(),
        "API error (502): An error occurred"
    );
    assert_eq!(ApiResponse::new(StatusCode::OK, vec![]).value().unwrap(), None);
}
