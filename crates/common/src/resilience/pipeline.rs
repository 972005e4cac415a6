//! Retry and circuit breaker composed into one execution pipeline
//!
//! The composition order is fixed: retry is the outer policy and the circuit
//! breaker the inner one. Every attempt issued by the retry policy is
//! individually admitted (or rejected) by the breaker, and a rejection counts
//! as a failed attempt, so an open circuit burns through the remaining
//! attempts without touching the network.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::circuit_breaker::{CircuitBreaker, Clock, ResilienceError, SystemClock};
use super::classify::Classify;
use super::retry::{RetryPolicy, RetryResult};

/// Retry (outer) wrapped around a shared circuit breaker (inner)
pub struct ResiliencePipeline<C: Clock = SystemClock> {
    retry: Arc<RetryPolicy>,
    breaker: Arc<CircuitBreaker<C>>,
}

impl<C: Clock> Clone for ResiliencePipeline<C> {
    fn clone(&self) -> Self {
        Self { retry: Arc::clone(&self.retry), breaker: Arc::clone(&self.breaker) }
    }
}

impl<C: Clock> std::fmt::Debug for ResiliencePipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResiliencePipeline")
            .field("retry", &self.retry.name())
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

impl<C: Clock> ResiliencePipeline<C> {
    /// Combine a retry policy with the breaker it wraps
    pub fn new(retry: Arc<RetryPolicy>, breaker: Arc<CircuitBreaker<C>>) -> Self {
        Self { retry, breaker }
    }

    /// The outer retry policy
    pub fn retry(&self) -> &Arc<RetryPolicy> {
        &self.retry
    }

    /// The inner circuit breaker
    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    /// Run `operation` through retry and breaker.
    ///
    /// The operation is invoked once per admitted attempt. On failure the
    /// error tells the caller whether the breaker rejected the last attempt
    /// ([`ResilienceError::CircuitOpen`]) or the operation itself failed.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryResult<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        let breaker = &self.breaker;
        self.retry
            .execute(cancel, |_attempt| {
                let breaker = Arc::clone(breaker);
                let attempt = operation();
                async move { breaker.execute(move || attempt).await }
            })
            .await
    }
}
