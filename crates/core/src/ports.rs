//! Port interfaces for the remote account resource

use async_trait::async_trait;
use tally_domain::{Account, CallOutcome};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Typed access to the remote account resource
///
/// Implementations route every call through the resilience pipeline and
/// translate the result into a [`CallOutcome`]. They keep no local state and
/// never retry on their own. A fired `cancel` token yields
/// [`CallOutcome::Cancelled`].
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Identifiers of all accounts, in server order
    async fn list_ids(&self, cancel: &CancellationToken) -> CallOutcome<Vec<Uuid>>;

    /// Fresh snapshot of one account; `NotFound` when it does not exist
    async fn get(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account>;

    /// Create the account with the given identifier
    async fn create(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account>;

    /// Ask the server to increment the account counter
    async fn update(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account>;

    /// Delete the account
    async fn delete(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<()>;
}
