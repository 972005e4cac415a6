//! HTTP implementation of the account gateway port
//!
//! Maps each port operation to a route under the configured base URL and
//! folds transport results into [`CallOutcome`] values:
//!
//! | Operation  | Route                    | Success body      |
//! |------------|--------------------------|-------------------|
//! | `list_ids` | `GET /accounts`          | `[uuid, ...]`     |
//! | `get`      | `GET /accounts/{id}`     | `{ id, counter }` |
//! | `create`   | `POST /accounts/{id}`    | `{ id, counter }` |
//! | `update`   | `PUT /accounts/{id}`     | `{ id, counter }` |
//! | `delete`   | `DELETE /accounts/{id}`  | ignored           |
//!
//! Only `get` turns a 404 into [`CallOutcome::NotFound`].

use std::fmt;

use async_trait::async_trait;
use reqwest::Method;
use tally_common::resilience::{Clock, SystemClock};
use tally_core::AccountGateway;
use tally_domain::{Account, CallOutcome, FailureDetail};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::errors::{FailureClass, TransportError};
use crate::http::ResilientTransport;

const ACCOUNTS_PATH: &str = "accounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    ListIds,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::ListIds => "list_ids",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account gateway backed by the resource server's HTTP API
#[derive(Debug, Clone)]
pub struct HttpAccountGateway<C: Clock = SystemClock> {
    transport: ResilientTransport<C>,
}

impl<C: Clock> HttpAccountGateway<C> {
    pub fn new(transport: ResilientTransport<C>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &ResilientTransport<C> {
        &self.transport
    }
}

fn account_path(id: Uuid) -> String {
    format!("{ACCOUNTS_PATH}/{id}")
}

/// Fold a transport result into the outcome of one port operation.
fn settle<T>(
    operation: Operation,
    id: Option<Uuid>,
    result: Result<T, TransportError>,
) -> CallOutcome<T> {
    let error = match result {
        Ok(value) => return CallOutcome::Success(value),
        Err(error) => error,
    };

    if matches!(error, TransportError::Cancelled) {
        return CallOutcome::Cancelled;
    }
    if operation == Operation::Get && error.is_not_found() {
        return CallOutcome::NotFound;
    }

    let detail = error.detail();
    log_failure(operation, id, &detail);
    match error.class() {
        FailureClass::Transient => CallOutcome::TransientFailure(detail),
        FailureClass::Permanent => CallOutcome::PermanentFailure(detail),
    }
}

fn log_failure(operation: Operation, id: Option<Uuid>, detail: &FailureDetail) {
    let status = detail.status;
    let body = detail.body.as_deref();
    match id {
        Some(id) => warn!(
            operation = %operation,
            account_id = %id,
            status,
            body,
            error = %detail.message,
            "Account call failed"
        ),
        None => warn!(
            operation = %operation,
            status,
            body,
            error = %detail.message,
            "Account call failed"
        ),
    }
}

#[async_trait]
impl<C: Clock> AccountGateway for HttpAccountGateway<C> {
    #[instrument(skip_all)]
    async fn list_ids(&self, cancel: &CancellationToken) -> CallOutcome<Vec<Uuid>> {
        let result = self.transport.send_json(Method::GET, ACCOUNTS_PATH, cancel).await;
        settle(Operation::ListIds, None, result)
    }

    #[instrument(skip(self, cancel), fields(account_id = %id))]
    async fn get(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account> {
        let result = self.transport.send_json(Method::GET, &account_path(id), cancel).await;
        settle(Operation::Get, Some(id), result)
    }

    #[instrument(skip(self, cancel), fields(account_id = %id))]
    async fn create(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account> {
        let result = self.transport.send_json(Method::POST, &account_path(id), cancel).await;
        settle(Operation::Create, Some(id), result)
    }

    #[instrument(skip(self, cancel), fields(account_id = %id))]
    async fn update(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<Account> {
        let result = self.transport.send_json(Method::PUT, &account_path(id), cancel).await;
        settle(Operation::Update, Some(id), result)
    }

    #[instrument(skip(self, cancel), fields(account_id = %id))]
    async fn delete(&self, id: Uuid, cancel: &CancellationToken) -> CallOutcome<()> {
        let result = self.transport.send(Method::DELETE, &account_path(id), cancel).await;
        settle(Operation::Delete, Some(id), result.map(|_| ()))
    }
}
