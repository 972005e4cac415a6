//! Account lifecycle decision
//!
//! Pure functions only. The reconciler feeds in a freshly fetched snapshot,
//! gets back the single action to take, and later hands the action's results
//! to the matching verifier to learn whether the action took effect.
//!
//! ```text
//! get(id) ──▶ Absent ──────────────▶ Create ──▶ Created | NotCreated
//!         ├─▶ BelowThreshold(c) ───▶ Update ──▶ Updated | NotUpdated
//!         ├─▶ AtOrAboveThreshold(c) ▶ Delete ──▶ Deleted | NotDeleted
//!         └─▶ failure ─────────────▶ Skip
//! ```

use std::fmt;

use tally_domain::{Account, CallOutcome};

/// What a fresh `get` revealed about one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Absent,
    BelowThreshold(Account),
    AtOrAboveThreshold(Account),
    /// No reliable snapshot this cycle
    Unobservable,
    /// The lookup was interrupted by shutdown
    Interrupted,
}

impl AccountState {
    /// Classify the outcome of `get` against the deletion threshold
    pub fn observe(outcome: &CallOutcome<Account>, threshold: u32) -> Self {
        match outcome {
            CallOutcome::Success(account) if account.counter < threshold => {
                Self::BelowThreshold(*account)
            }
            CallOutcome::Success(account) => Self::AtOrAboveThreshold(*account),
            CallOutcome::NotFound => Self::Absent,
            CallOutcome::TransientFailure(_) | CallOutcome::PermanentFailure(_) => {
                Self::Unobservable
            }
            CallOutcome::Cancelled => Self::Interrupted,
        }
    }
}

/// The one action to take for an account this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    /// Increment; `observed` is the counter seen before the call
    Update { observed: u32 },
    Delete { observed: u32 },
    Skip,
}

/// Pick the action for an observed account state
pub fn decide(state: &AccountState) -> Action {
    match state {
        AccountState::Absent => Action::Create,
        AccountState::BelowThreshold(account) => Action::Update { observed: account.counter },
        AccountState::AtOrAboveThreshold(account) => Action::Delete { observed: account.counter },
        AccountState::Unobservable | AccountState::Interrupted => Action::Skip,
    }
}

/// Verified result of reconciling one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created { counter: u32 },
    NotCreated,
    Updated { counter: u32 },
    NotUpdated,
    Deleted,
    NotDeleted,
    Skipped,
    /// Shutdown interrupted the account mid-flight
    Interrupted,
}

impl ReconcileOutcome {
    /// Whether the intended action was confirmed
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Updated { .. } | Self::Deleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::NotCreated => "not created",
            Self::Updated { .. } => "updated",
            Self::NotUpdated => "not updated",
            Self::Deleted => "deleted",
            Self::NotDeleted => "not deleted",
            Self::Skipped => "skipped",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A create is confirmed by any successful response
pub fn verify_create(created: &CallOutcome<Account>) -> ReconcileOutcome {
    match created {
        CallOutcome::Success(account) => ReconcileOutcome::Created { counter: account.counter },
        CallOutcome::Cancelled => ReconcileOutcome::Interrupted,
        _ => ReconcileOutcome::NotCreated,
    }
}

/// An update is confirmed only when the counter moved by exactly one
pub fn verify_update(observed: u32, updated: &CallOutcome<Account>) -> ReconcileOutcome {
    match updated {
        CallOutcome::Success(account) if Some(account.counter) == observed.checked_add(1) => {
            ReconcileOutcome::Updated { counter: account.counter }
        }
        CallOutcome::Cancelled => ReconcileOutcome::Interrupted,
        _ => ReconcileOutcome::NotUpdated,
    }
}

/// A delete is confirmed when the call succeeded and the follow-up lookup
/// reports the account missing.
///
/// A follow-up snapshot with a lower counter is not accepted as proof: it may
/// be a re-created account, or the old one after a server-side reset.
pub fn verify_delete(
    deleted: &CallOutcome<()>,
    follow_up: &CallOutcome<Account>,
) -> ReconcileOutcome {
    if deleted.is_cancelled() || follow_up.is_cancelled() {
        return ReconcileOutcome::Interrupted;
    }
    if deleted.is_success() && follow_up.is_not_found() {
        ReconcileOutcome::Deleted
    } else {
        ReconcileOutcome::NotDeleted
    }
}
