use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, StatusCode};
use tally_domain::{ApiClientConfig, TallyError};
use tracing::debug;

use crate::api::errors::TransportError;
use crate::errors::InfraError;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

/// Single-attempt HTTP client with timeout and default headers.
///
/// Retrying is left to the resilience pipeline wrapped around it.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, TallyError> {
        Self::builder().build()
    }

    /// Build a client from the API client section of the configuration
    pub fn from_config(config: &ApiClientConfig) -> Result<Self, TallyError> {
        Self::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .headers(&config.headers)?
            .build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute one request and read the whole body.
    ///
    /// Non-2xx statuses are returned as classified errors carrying the body.
    pub async fn send(&self, builder: RequestBuilder) -> Result<HttpReply, TransportError> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                return Err(err.into());
            }
        };

        let status = response.status();
        let body = response.text().await?;
        debug!(%method, %url, %status, "received HTTP response");

        if status.is_success() {
            Ok(HttpReply { status, body })
        } else {
            Err(TransportError::from_status(status.as_u16(), body))
        }
    }
}

/// User agent sent by clients built from configuration
pub const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), user_agent: None, default_headers: None }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Set default headers from name/value strings.
    ///
    /// # Errors
    /// Returns `TallyError::Config` for an invalid header name or value.
    pub fn headers(self, headers: &BTreeMap<String, String>) -> Result<Self, TallyError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TallyError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TallyError::Config(format!("invalid value for header '{name}': {e}"))
            })?;
            map.insert(name, value);
        }
        Ok(self.default_headers(map))
    }

    pub fn build(self) -> Result<HttpClient, TallyError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            TallyError::from(infra)
        })?;

        Ok(HttpClient { client })
    }
}
