//! HTTP transport bound to a single backend service

use crate::config::{ServiceDescriptor, ServiceKey};
use crate::errors::{ConsoleError, Result, TransportError};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Authentication material handed over by the external auth collaborator.
/// The transport attaches it to every request and never refreshes it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    SessionCookie(String),
}

impl Credentials {
    fn header(&self) -> Result<(HeaderName, HeaderValue)> {
        let (name, raw) = match self {
            Credentials::Bearer(token) => (header::AUTHORIZATION, format!("Bearer {}", token)),
            Credentials::SessionCookie(cookie) => (header::COOKIE, cookie.clone()),
        };

        let mut value = HeaderValue::from_str(&raw)
            .map_err(|e| ConsoleError::Config(format!("invalid credential header: {}", e)))?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
            Credentials::SessionCookie(_) => f.write_str("SessionCookie(..)"),
        }
    }
}

/// Status and body of a settled exchange, before any success/JSON policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Configured transport for one backend. Performs no retries.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    descriptor: ServiceDescriptor,
}

impl ServiceClient {
    pub fn new(descriptor: ServiceDescriptor, credentials: Option<&Credentials>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(credentials) = credentials {
            let (name, value) = credentials.header()?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(descriptor.timeout)
            .default_headers(headers)
            .user_agent(format!("campus_console/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConsoleError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, descriptor })
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> ServiceKey {
        self.descriptor.key
    }

    /// Issue one request and return whatever settled, without judging the
    /// status code. Only timeouts and connection failures are errors here.
    #[instrument(skip(self, body), fields(service = %self.descriptor.key))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = self.descriptor.url(path);
        let budget = self.descriptor.timeout;

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{} {}", method, url);

        let exchange = async {
            let response = request.send().await.map_err(|e| classify(e, budget))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| classify(e, budget))?;
            Ok::<_, TransportError>(RawResponse { status, body })
        };

        let response = timeout(budget, exchange)
            .await
            .map_err(|_| TransportError::Timeout(budget))??;

        debug!("{} {} -> {}", method, url, response.status);
        Ok(response)
    }

    /// Issue one request and decode its JSON payload.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        let is_delete = method == Method::DELETE;
        let response = self.send(method, path, body).await?;
        decode(is_delete, response)
    }

    pub async fn get(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.call(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> std::result::Result<Value, TransportError> {
        self.call(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> std::result::Result<Value, TransportError> {
        self.call(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.call(Method::DELETE, path, None).await
    }
}

/// Several backends answer deletes and 204s with no body at all, so those
/// decode to `Value::Null` rather than a parse failure.
fn decode(is_delete: bool, response: RawResponse) -> std::result::Result<Value, TransportError> {
    if !response.is_success() {
        return Err(TransportError::Http {
            status: response.status,
            body: response.body,
        });
    }

    if is_delete || response.status == 204 || response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&response.body).map_err(|e| TransportError::Parse(e.to_string()))
}

fn classify(err: reqwest::Error, budget: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(budget)
    } else if err.is_decode() {
        TransportError::Parse(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
