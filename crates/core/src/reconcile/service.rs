//! Reconciliation service - core business logic

use std::sync::Arc;
use std::time::Duration;

use tally_domain::{CallOutcome, LifecycleConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::lifecycle::{self, AccountState, Action, ReconcileOutcome};
use crate::ports::AccountGateway;

/// Outcomes of one pass over all listed accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Per-account results in processing order
    pub outcomes: Vec<(Uuid, ReconcileOutcome)>,
    /// The account listing itself failed
    pub listing_failed: bool,
    /// Shutdown cut the cycle short
    pub interrupted: bool,
}

impl CycleReport {
    /// Number of accounts that ended with `outcome`
    pub fn count(&self, outcome: fn(&ReconcileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, result)| outcome(result)).count()
    }

    pub fn outcome_for(&self, id: Uuid) -> Option<ReconcileOutcome> {
        self.outcomes.iter().find(|(account, _)| *account == id).map(|(_, result)| *result)
    }
}

/// Drives every listed account through the lifecycle policy
pub struct ReconcileService {
    gateway: Arc<dyn AccountGateway>,
    delete_after_updates: u32,
    poll_interval: Duration,
}

impl ReconcileService {
    /// Create a new reconciliation service
    pub fn new(gateway: Arc<dyn AccountGateway>, config: &LifecycleConfig) -> Self {
        Self {
            gateway,
            delete_after_updates: config.delete_after_updates,
            poll_interval: config.poll_interval,
        }
    }

    /// Pause between two cycles
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Failures never end the loop. The pause between cycles is interrupted
    /// by cancellation.
    #[instrument(skip_all, fields(threshold = self.delete_after_updates))]
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Reconciliation loop started");

        while !cancel.is_cancelled() {
            let report = self.run_cycle(&cancel).await;
            debug!(
                accounts = report.outcomes.len(),
                confirmed = report.count(ReconcileOutcome::is_confirmed),
                listing_failed = report.listing_failed,
                "Reconciliation cycle finished"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Reconciliation loop stopped");
    }

    /// List all accounts and reconcile them one after another
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        let ids = match self.gateway.list_ids(cancel).await {
            CallOutcome::Success(ids) => ids,
            CallOutcome::Cancelled => {
                report.interrupted = true;
                return report;
            }
            other => {
                warn!(outcome = other.kind(), "Could not list accounts, skipping cycle");
                report.listing_failed = true;
                return report;
            }
        };

        for id in ids {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let outcome = self.process_account(id, cancel).await;
            report.outcomes.push((id, outcome));
            if outcome == ReconcileOutcome::Interrupted {
                report.interrupted = true;
                break;
            }
        }

        report
    }

    /// Fetch, decide, act and verify for a single account
    pub async fn process_account(&self, id: Uuid, cancel: &CancellationToken) -> ReconcileOutcome {
        let snapshot = self.gateway.get(id, cancel).await;
        let state = AccountState::observe(&snapshot, self.delete_after_updates);

        let outcome = match lifecycle::decide(&state) {
            Action::Create => {
                let created = self.gateway.create(id, cancel).await;
                lifecycle::verify_create(&created)
            }
            Action::Update { observed } => {
                let updated = self.gateway.update(id, cancel).await;
                lifecycle::verify_update(observed, &updated)
            }
            Action::Delete { .. } => {
                let deleted = self.gateway.delete(id, cancel).await;
                if deleted.is_cancelled() {
                    ReconcileOutcome::Interrupted
                } else {
                    let follow_up = self.gateway.get(id, cancel).await;
                    lifecycle::verify_delete(&deleted, &follow_up)
                }
            }
            Action::Skip if state == AccountState::Interrupted => ReconcileOutcome::Interrupted,
            Action::Skip => ReconcileOutcome::Skipped,
        };

        log_outcome(id, &state, &outcome);
        outcome
    }
}

fn log_outcome(id: Uuid, state: &AccountState, outcome: &ReconcileOutcome) {
    let observed = match state {
        AccountState::BelowThreshold(account) | AccountState::AtOrAboveThreshold(account) => {
            Some(account.counter)
        }
        _ => None,
    };

    match outcome {
        ReconcileOutcome::Created { counter } => {
            info!(account_id = %id, counter, "Account created");
        }
        ReconcileOutcome::Updated { counter } => {
            info!(account_id = %id, counter, "Account updated");
        }
        ReconcileOutcome::Deleted => {
            info!(account_id = %id, counter = observed, "Account deleted");
        }
        ReconcileOutcome::NotCreated => warn!(account_id = %id, "Account not created"),
        ReconcileOutcome::NotUpdated => {
            warn!(account_id = %id, counter = observed, "Account not updated");
        }
        ReconcileOutcome::NotDeleted => {
            warn!(account_id = %id, counter = observed, "Account not deleted");
        }
        ReconcileOutcome::Skipped => {
            warn!(account_id = %id, "Account lookup failed, skipping this cycle");
        }
        ReconcileOutcome::Interrupted => debug!(account_id = %id, "Account processing interrupted"),
    }
}
