//! Client builder implementation
//!
//! Builds the reqwest client behind the `HttpTransport` seam.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;
use tracing::debug;

use super::{HttpMethod, HttpRequest, HttpTransport, RawResponse};
use crate::error::{mapping, EngineError, Result};

/// Default user agent for outbound calls
const DEFAULT_USER_AGENT: &str = "integration-replay/0.1.0";

/// Builder for the reqwest-backed transport
pub struct ClientBuilder {
    /// Custom headers to include with all requests
    custom_headers: HashMap<String, String>,

    /// Request timeout
    timeout: Option<Duration>,

    /// User agent
    user_agent: Option<String>,

    /// Enable response decompression
    compression: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            custom_headers: HashMap::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            compression: true,
        }
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Build an HTTP client with the configured settings
    pub fn build_http_client(&self) -> Result<ReqwestClient> {
        let mut builder = ReqwestClient::builder();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder = builder.gzip(self.compression);

        let headers = header_map(&self.custom_headers)?;
        builder = builder.default_headers(headers);

        builder.build()
            .map_err(|e| EngineError::configuration(format!("Failed to build HTTP client: {}", e)))
    }

    /// Build the transport
    pub fn build(self) -> Result<ReqwestTransport> {
        Ok(ReqwestTransport {
            client: self.build_http_client()?,
        })
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let header_name = HeaderName::from_str(key)
            .map_err(|e| EngineError::configuration(format!("Invalid header name: {}", e)))?;

        let header_value = HeaderValue::from_str(value)
            .map_err(|e| EngineError::configuration(format!("Invalid header value: {}", e)))?;

        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// `HttpTransport` over a shared reqwest client
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Transport with default builder settings and the given timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        ClientBuilder::new().timeout(timeout).build()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let start_time = Instant::now();
        let mut builder = self.client
            .request(method, &request.url)
            .headers(header_map(&request.headers)?);

        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| mapping::status_text(status));
        let body = response.text().await?;

        debug!(
            url = %request.url,
            status,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "upstream call finished"
        );

        Ok(RawResponse { status, status_text, body })
    }
}
