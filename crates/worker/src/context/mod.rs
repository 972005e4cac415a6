//! Worker context - dependency wiring

use std::sync::Arc;

use tally_common::resilience::PolicyRegistry;
use tally_core::{AccountGateway, ReconcileService, ReconcileWorker};
use tally_domain::{Result, TallyConfig};
use tally_infra::{HttpAccountGateway, ResilientTransport};
use tracing::info;

/// Worker context - holds the wired services
///
/// One policy registry per process, so every gateway built from this context
/// shares the same circuit breaker.
pub struct WorkerContext {
    pub config: TallyConfig,
    pub registry: Arc<PolicyRegistry>,
    pub gateway: Arc<HttpAccountGateway>,
    pub service: Arc<ReconcileService>,
}

impl WorkerContext {
    /// Build every service from a loaded configuration.
    ///
    /// # Errors
    /// Returns `TallyError::Config` when the configuration is invalid or the
    /// HTTP client cannot be built from it.
    pub fn new(config: TallyConfig) -> Result<Self> {
        config.validate()?;

        let registry = PolicyRegistry::new();
        let transport =
            ResilientTransport::provision(&config.api_client, &config.http_policies, &registry)?;
        let registry = Arc::new(registry);
        let gateway = Arc::new(HttpAccountGateway::new(transport));
        let service = Arc::new(ReconcileService::new(
            Arc::clone(&gateway) as Arc<dyn AccountGateway>,
            &config.lifecycle,
        ));

        info!(
            base_url = %config.api_client.base_url,
            delete_after_updates = config.lifecycle.delete_after_updates,
            poll_interval_ms = config.lifecycle.poll_interval.as_millis() as u64,
            retry_max_attempts = config.http_policies.retry_max_attempts,
            breaker_failure_threshold = config.http_policies.breaker_failure_threshold,
            "Worker context initialized"
        );

        Ok(Self { config, registry, gateway, service })
    }

    /// Background worker driving the reconciliation loop
    pub fn worker(&self) -> ReconcileWorker {
        ReconcileWorker::new(Arc::clone(&self.service))
    }
}
