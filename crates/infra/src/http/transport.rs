//! Resilient transport
//!
//! Every request issued by the account gateway goes through one shared
//! [`ResiliencePipeline`]: retry outermost, circuit breaker innermost, and a
//! single-attempt [`HttpClient`] underneath.

use reqwest::Method;
use serde::de::DeserializeOwned;
use tally_common::resilience::{
    CircuitBreakerConfig, Clock, PolicyKey, PolicyRegistry, ResilienceError, ResiliencePipeline,
    RetryConfig, RetryError, SystemClock,
};
use tally_domain::{ApiClientConfig, HttpPoliciesConfig, Result, TallyError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::client::{HttpClient, HttpReply};
use crate::api::errors::TransportError;
use crate::errors::InfraError;

/// Translate the configured policy section into resilience configs
pub fn policies_from(config: &HttpPoliciesConfig) -> (RetryConfig, CircuitBreakerConfig) {
    let retry = RetryConfig {
        max_attempts: config.retry_max_attempts,
        base_delay: config.retry_base_delay,
        max_delay: config.retry_max_delay,
    };
    let breaker = CircuitBreakerConfig {
        failure_threshold: config.breaker_failure_threshold,
        open_duration: config.breaker_open_duration,
    };
    (retry, breaker)
}

/// HTTP transport bound to a base URL and a resilience pipeline
#[derive(Clone)]
pub struct ResilientTransport<C: Clock = SystemClock> {
    client: HttpClient,
    base_url: Url,
    pipeline: ResiliencePipeline<C>,
}

impl<C: Clock> std::fmt::Debug for ResilientTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("base_url", &self.base_url.as_str())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl<C: Clock + Clone> ResilientTransport<C> {
    /// Build the client from `api` and provision the shared policies.
    ///
    /// Provisioning is idempotent: transports built from the same registry
    /// share one breaker.
    ///
    /// # Errors
    /// Returns `TallyError::Config` for an invalid base URL, header or policy.
    pub fn provision(
        api: &ApiClientConfig,
        policies: &HttpPoliciesConfig,
        registry: &PolicyRegistry<C>,
    ) -> Result<Self> {
        let base_url = api.parsed_base_url()?;
        let client = HttpClient::from_config(api)?;
        let (retry, breaker) = policies_from(policies);
        let pipeline =
            registry.provision(retry, breaker).map_err(|e| TallyError::from(InfraError::from(e)))?;

        debug!(
            base_url = %base_url,
            retry = %PolicyKey::Retry,
            breaker = %PolicyKey::CircuitBreaker,
            "Resilient transport provisioned"
        );
        Ok(Self::new(client, base_url, pipeline))
    }
}

impl<C: Clock> ResilientTransport<C> {
    pub fn new(client: HttpClient, base_url: Url, pipeline: ResiliencePipeline<C>) -> Self {
        Self { client, base_url: with_trailing_slash(base_url), pipeline }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pipeline(&self) -> &ResiliencePipeline<C> {
        &self.pipeline
    }

    /// Resolve `path` against the base URL, keeping its last segment
    pub fn url(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid path '{path}': {e}")))
    }

    /// Send a request with retry and circuit breaker protection.
    ///
    /// A rejection by the open breaker on the last attempt surfaces as
    /// [`TransportError::CircuitOpen`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<HttpReply, TransportError> {
        self.execute(method, path, cancel, Ok).await
    }

    /// Send a request and decode its JSON body as part of the protected call.
    ///
    /// An undecodable 2xx body is a permanent result, so it neither counts
    /// against the breaker nor resets its failure count.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<T, TransportError> {
        self.execute(method, path, cancel, decode_json::<T>).await
    }

    async fn execute<T, F>(
        &self,
        method: Method,
        path: &str,
        cancel: &CancellationToken,
        decode: F,
    ) -> std::result::Result<T, TransportError>
    where
        F: Fn(HttpReply) -> std::result::Result<T, TransportError>,
    {
        let url = self.url(path)?;
        let client = &self.client;
        let decode = &decode;
        let result = self
            .pipeline
            .execute(cancel, || {
                let request = client.request(method.clone(), url.clone());
                async move { client.send(request).await.and_then(decode) }
            })
            .await;

        result.map_err(|error| {
            let attempts = error.attempts();
            let error = flatten(error);
            debug!(%method, %url, attempts, error = %error, "Request failed after policies");
            error
        })
    }
}

fn decode_json<T: DeserializeOwned>(reply: HttpReply) -> std::result::Result<T, TransportError> {
    match serde_json::from_str(&reply.body) {
        Ok(value) => Ok(value),
        Err(err) => Err(TransportError::UnexpectedBody {
            status: reply.status.as_u16(),
            body: reply.body,
            reason: err.to_string(),
        }),
    }
}

fn flatten(error: RetryError<ResilienceError<TransportError>>) -> TransportError {
    match error {
        RetryError::AttemptsExhausted { last, .. } => unwrap_resilience(last),
        RetryError::NonRetryable { error, .. } => unwrap_resilience(error),
        RetryError::Cancelled { .. } => TransportError::Cancelled,
    }
}

fn unwrap_resilience(error: ResilienceError<TransportError>) -> TransportError {
    match error {
        ResilienceError::CircuitOpen => TransportError::CircuitOpen,
        ResilienceError::OperationFailed { source } => source,
    }
}

// `Url::join` replaces the last segment unless the base ends with '/'.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tally_common::resilience::CircuitState;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_policies(attempts: u32, threshold: u32) -> HttpPoliciesConfig {
        HttpPoliciesConfig {
            retry_max_attempts: attempts,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            breaker_failure_threshold: threshold,
            breaker_open_duration: Duration::from_secs(60),
        }
    }

    fn api_config(base_url: String) -> ApiClientConfig {
        ApiClientConfig { base_url, ..ApiClientConfig::default() }
    }

    #[test]
    fn joins_paths_below_versioned_prefix() {
        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config("http://localhost:5000/v1.0".to_string()),
            &HttpPoliciesConfig::default(),
            &registry,
        )
        .expect("transport");

        assert_eq!(
            transport.url("accounts").unwrap().as_str(),
            "http://localhost:5000/v1.0/accounts"
        );
        assert_eq!(
            transport.url("/accounts/abc").unwrap().as_str(),
            "http://localhost:5000/v1.0/accounts/abc"
        );
    }

    #[test]
    fn policies_follow_configuration() {
        let (retry, breaker) = policies_from(&fast_policies(4, 2));
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_delay, Duration::from_millis(1));
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.open_duration, Duration::from_secs(60));
    }

    #[test]
    fn invalid_policy_is_a_config_error() {
        let registry = PolicyRegistry::new();
        let result = ResilientTransport::provision(
            &ApiClientConfig::default(),
            &fast_policies(0, 3),
            &registry,
        );
        assert!(matches!(result, Err(TallyError::Config(_))));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/accounts"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(format!("{}/v1.0", server.uri())),
            &fast_policies(5, 10),
            &registry,
        )
        .expect("transport");

        let cancel = CancellationToken::new();
        let reply = transport.send(Method::GET, "accounts", &cancel).await.expect("reply");
        assert_eq!(reply.body, "[]");
        assert_eq!(transport.pipeline().breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad id"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(server.uri()),
            &fast_policies(5, 1),
            &registry,
        )
        .expect("transport");

        let error = transport
            .send(Method::PUT, "accounts/x", &CancellationToken::new())
            .await
            .expect_err("400 must fail");

        assert!(matches!(error, TransportError::Client { status: 400, .. }));
        assert_eq!(transport.pipeline().breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_is_reported_as_circuit_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(server.uri()),
            &fast_policies(4, 2),
            &registry,
        )
        .expect("transport");

        let error = transport
            .send(Method::GET, "accounts", &CancellationToken::new())
            .await
            .expect_err("breaker opens");

        assert!(matches!(error, TransportError::CircuitOpen));
        assert_eq!(transport.pipeline().breaker().state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn decodes_json_inside_protected_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1, 2, 3]"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(server.uri()),
            &fast_policies(3, 3),
            &registry,
        )
        .expect("transport");

        let values: Vec<u32> = transport
            .send_json(Method::GET, "accounts", &CancellationToken::new())
            .await
            .expect("decoded");
        assert_eq!(values, vec![1, 2, 3]);
    }

    /// Validates that an undecodable body leaves the failure count untouched.
    ///
    /// # Test Steps
    /// 1. A 500 counts one failure against a breaker with threshold 2
    /// 2. A 200 with garbage settles as a permanent result, without retry
    /// 3. A second 500 reaches the threshold and opens the circuit
    #[tokio::test]
    async fn undecodable_body_neither_counts_nor_resets_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(server.uri()),
            &fast_policies(1, 2),
            &registry,
        )
        .expect("transport");
        let breaker = transport.pipeline().breaker();
        let cancel = CancellationToken::new();

        let first = transport.send_json::<Vec<u32>>(Method::GET, "accounts", &cancel).await;
        assert!(matches!(first, Err(TransportError::Server { status: 500, .. })));
        assert_eq!(breaker.metrics().consecutive_failures, 1);

        let second = transport.send_json::<Vec<u32>>(Method::GET, "accounts", &cancel).await;
        assert!(matches!(second, Err(TransportError::UnexpectedBody { status: 200, .. })));
        assert_eq!(breaker.metrics().consecutive_failures, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);

        let third = transport.send_json::<Vec<u32>>(Method::GET, "accounts", &cancel).await;
        assert!(matches!(third, Err(TransportError::Server { status: 500, .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn cancelled_token_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let registry = PolicyRegistry::new();
        let transport = ResilientTransport::provision(
            &api_config(server.uri()),
            &HttpPoliciesConfig::default(),
            &registry,
        )
        .expect("transport");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = transport.send(Method::GET, "accounts", &cancel).await.expect_err("cancelled");
        assert!(matches!(error, TransportError::Cancelled));
    }
}
