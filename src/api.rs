//! REST collaborator used by submit callbacks.

use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::error::{Effect, Transience};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("response from {url} is not json: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn transience(&self) -> Transience {
        match self {
            ApiError::Client(_) | ApiError::Decode { .. } => Transience::Permanent,
            ApiError::Request { source, .. } if source.is_timeout() || source.is_connect() => {
                Transience::Retryable
            }
            ApiError::Request { .. } => Transience::Unknown,
            ApiError::Status { status, .. } => match status {
                408 | 429 | 502 | 503 | 504 => Transience::Retryable,
                400..=499 => Transience::Permanent,
                _ => Transience::Unknown,
            },
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ApiError::Client(_) => Effect::None,
            ApiError::Request { source, .. } if source.is_connect() => Effect::None,
            ApiError::Request { .. } => Effect::Unknown,
            ApiError::Status { status, .. } if (400..500).contains(status) => Effect::None,
            ApiError::Status { .. } => Effect::Unknown,
            ApiError::Decode { .. } => Effect::Some,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// JSON-over-HTTP operations against the back-office API. Paths are
/// relative to the client's base URL.
pub trait ApiClient: Send + Sync {
    fn get(&self, path: &str) -> Result<Value, ApiError>;
    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
    fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
    fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
    fn delete(&self, path: &str) -> Result<Value, ApiError>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(config.base_url.clone(), config.token.clone(), config.timeout())
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let url = self.url_for(path);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        tracing::debug!(%method, %url, "api request");
        let resp = req.send().map_err(|source| ApiError::Request {
            url: url.clone(),
            source,
        })?;
        read_response(&url, resp)
    }
}

impl ApiClient for HttpApi {
    fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, path, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::POST, path, Some(body))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::PUT, path, Some(body))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::PATCH, path, Some(body))
    }

    fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, None)
    }
}

fn read_response(url: &str, resp: Response) -> Result<Value, ApiError> {
    let status = resp.status();
    let bytes = resp.bytes().map_err(|source| ApiError::Request {
        url: url.to_string(),
        source,
    })?;

    if !status.is_success() {
        let message = error_message(&bytes)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        tracing::debug!(status = status.as_u16(), %url, "api error: {message}");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}

/// The `message` (or `error`) string of a JSON error body.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .iter()
        .filter_map(|key| value.get(*key)?.as_str())
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_for_joins_without_double_slashes() {
        let api = HttpApi::new("https://mfi.example/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(api.url_for("/clients"), "https://mfi.example/api/clients");
        assert_eq!(api.url_for("loans/7"), "https://mfi.example/api/loans/7");
    }

    #[test]
    fn error_message_prefers_message_then_error() {
        assert_eq!(
            error_message(br#"{"message":"Phone number already registered","error":"conflict"}"#),
            Some("Phone number already registered".to_string())
        );
        assert_eq!(
            error_message(br#"{"error":"forbidden"}"#),
            Some("forbidden".to_string())
        );
        assert_eq!(error_message(br#"{"message":""}"#), None);
        assert_eq!(error_message(b"<html>bad gateway</html>"), None);
    }

    #[test]
    fn status_errors_classify_by_code() {
        let conflict = ApiError::Status {
            status: 409,
            message: "exists".into(),
        };
        assert_eq!(conflict.transience(), Transience::Permanent);
        assert_eq!(conflict.effect(), Effect::None);
        assert_eq!(conflict.to_string(), "exists");

        let unavailable = ApiError::Status {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert!(unavailable.transience().is_retryable());
        assert_eq!(unavailable.effect(), Effect::Unknown);
    }
}
