//! Integration tests for the resilience module
//!
//! Exercises retry and circuit breaker composed through a registry-built
//! pipeline, the way the account gateway uses them.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_common::resilience::{
    CircuitBreakerConfig, CircuitState, Classify, MockClock, PolicyRegistry, ResilienceError,
    RetryConfig, RetryError,
};
use tokio_util::sync::CancellationToken;

/// Custom error type for testing
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
struct TestError {
    message: String,
    transient: bool,
}

impl TestError {
    fn transient(message: &str) -> Self {
        Self { message: message.to_string(), transient: true }
    }

    fn permanent(message: &str) -> Self {
        Self { message: message.to_string(), transient: false }
    }
}

impl Classify for TestError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

fn retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(4))
        .build()
        .expect("valid retry config")
}

fn breaker_config(threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .failure_threshold(threshold)
        .open_duration(Duration::from_secs(10))
        .build()
        .expect("valid breaker config")
}

/// Validates that an open circuit short-circuits the remaining attempts.
///
/// # Test Steps
/// 1. Provision retry (7 attempts) and breaker (threshold 3)
/// 2. Run one call whose operation always fails transiently
/// 3. Verify only 3 operation invocations happened
/// 4. Verify the final error is a circuit rejection after 7 attempts
#[tokio::test(flavor = "multi_thread")]
async fn test_open_breaker_consumes_remaining_attempts_without_calls() {
    let registry = PolicyRegistry::with_clock(MockClock::new());
    let pipeline = registry.provision(retry_config(7), breaker_config(3)).expect("provision");
    let invocations = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = pipeline
        .execute(&CancellationToken::new(), || {
            let invocations = Arc::clone(&invocations);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err(TestError::transient("503 Service Unavailable"))
            }
        })
        .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.breaker().state(), CircuitState::Open);
    match result {
        Err(RetryError::AttemptsExhausted { attempts, last }) => {
            assert_eq!(attempts, 7);
            assert!(matches!(last, ResilienceError::CircuitOpen));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(pipeline.breaker().metrics().rejected_calls, 4);
}

/// Validates that permanent failures bypass both retry and breaker counting.
#[tokio::test(flavor = "multi_thread")]
async fn test_permanent_failure_is_not_retried_or_counted() {
    let registry = PolicyRegistry::new();
    let pipeline = registry.provision(retry_config(5), breaker_config(2)).expect("provision");
    let invocations = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = pipeline
        .execute(&CancellationToken::new(), || {
            let invocations = Arc::clone(&invocations);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err(TestError::permanent("409 Conflict"))
            }
        })
        .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(matches!(
        result,
        Err(RetryError::NonRetryable {
            attempts: 1,
            error: ResilienceError::OperationFailed { .. }
        })
    ));
    assert_eq!(pipeline.breaker().state(), CircuitState::Closed);
    assert_eq!(pipeline.breaker().metrics().consecutive_failures, 0);
}

/// Validates recovery when a transient outage ends before attempts run out.
#[tokio::test(flavor = "multi_thread")]
async fn test_transient_outage_recovers_and_resets_breaker() {
    let registry = PolicyRegistry::new();
    let pipeline = registry.provision(retry_config(7), breaker_config(5)).expect("provision");
    let invocations = Arc::new(AtomicU32::new(0));

    let result = pipeline
        .execute(&CancellationToken::new(), || {
            let invocations = Arc::clone(&invocations);
            async move {
                if invocations.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(TestError::transient("connection refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

    assert_eq!(result.expect("recovers"), 42);
    assert_eq!(invocations.load(Ordering::SeqCst), 4);
    assert_eq!(pipeline.breaker().metrics().consecutive_failures, 0);
}

/// Validates that the breaker is shared by every pipeline built from one
/// registry, so failures of one logical call affect the next.
#[tokio::test(flavor = "multi_thread")]
async fn test_breaker_state_is_shared_across_calls() {
    let clock = MockClock::new();
    let registry = PolicyRegistry::with_clock(clock.clone());
    registry.provision(retry_config(2), breaker_config(2)).expect("provision");
    let first = registry.pipeline("retry", "circuit-breaker").expect("pipeline");
    let second = registry.pipeline("retry", "circuit-breaker").expect("pipeline");

    let _: Result<(), _> = first
        .execute(&CancellationToken::new(), || async { Err(TestError::transient("timeout")) })
        .await;
    assert_eq!(second.breaker().state(), CircuitState::Open);

    let invocations = AtomicU32::new(0);
    let rejected: Result<(), _> = second
        .execute(&CancellationToken::new(), || {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TestError>(()) }
        })
        .await;
    assert!(rejected.is_err());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    clock.advance(Duration::from_secs(10));
    second
        .execute(&CancellationToken::new(), || async { Ok::<_, TestError>(()) })
        .await
        .expect("trial call succeeds");
    assert_eq!(first.breaker().state(), CircuitState::Closed);
}

/// Validates that cancellation stops a pipeline that is waiting out backoff.
#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_stops_pipeline_promptly() {
    let registry = PolicyRegistry::new();
    let slow_retry = RetryConfig::builder()
        .max_attempts(7)
        .base_delay(Duration::from_secs(20))
        .max_delay(Duration::from_secs(30))
        .build()
        .expect("valid retry config");
    let pipeline = registry.provision(slow_retry, breaker_config(7)).expect("provision");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result: Result<(), _> =
        pipeline.execute(&cancel, || async { Err(TestError::transient("reset")) }).await;

    assert!(matches!(result, Err(RetryError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}
