//! HTTP transport for Relay.
//!
//! This crate provides the network-facing [`HttpExecutor`] used by the CLI:
//!
//! - Constructing a `reqwest::Client` with a timeout and User-Agent
//! - Validating request URLs before dispatch
//! - Sending JSON bodies as JSON and string bodies verbatim
//! - Collecting status, headers, and body text into an [`HttpResponse`]
//!
//! Error statuses are returned as responses; only transport failures are errors.
//!
//! # Example
//!
//! ```ignore
//! use relay_api::ReqwestExecutor;
//! use relay_engine::HttpExecutor;
//! use relay_types::HttpRequest;
//!
//! let executor = ReqwestExecutor::new()?;
//! let response = executor
//!     .execute(&HttpRequest {
//!         method: "GET".into(),
//!         url: "https://api.example.com/users/42".into(),
//!         ..HttpRequest::default()
//!     })
//!     .await?;
//! println!("status: {}", response.status);
//! ```

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use indexmap::IndexMap;
use relay_engine::HttpExecutor;
use relay_types::{HttpRequest, HttpResponse};
use reqwest::{Client, Method, Url, header};
use serde_json::Value;
use tracing::debug;

/// Timeout applied to each request by [`ReqwestExecutor::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// [`HttpExecutor`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    http: Client,
}

impl ReqwestExecutor {
    /// Builds an executor with [`DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { http })
    }

    /// Wraps an already configured client.
    pub fn from_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = validate_url(&request.url)?;
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|error| anyhow!("invalid HTTP method '{}': {error}", request.method))?;
        debug!(method = %method, url = %url, header_count = request.headers.len(), "sending request");

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            None => builder,
            Some(Value::String(text)) => builder.body(text.clone()),
            Some(value) => builder.json(value),
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        let body = response.text().await.context("read response body")?;
        debug!(status = status.as_u16(), body_len = body.len(), "received response");

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Accepts absolute `http` and `https` URLs with a host.
fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|error| anyhow!("invalid request URL '{raw}': {error}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("request URL '{raw}' must use http or https; got '{}://'", url.scheme());
    }
    if url.host_str().is_none_or(str::is_empty) {
        bail!("request URL '{raw}' must include a host");
    }
    Ok(url)
}

/// Flattens response headers; repeated names are joined with `, `.
fn collect_headers(headers: &header::HeaderMap) -> IndexMap<String, String> {
    let mut collected: IndexMap<String, String> = IndexMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}
