//! In-memory `AccountGateway` with scriptable overrides
//!
//! Behaves like the real resource server (create adds an account at counter
//! 0, update increments, delete removes) unless an outcome has been queued
//! for the next call of an operation, in which case the queued outcome is
//! returned and the store is left untouched.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tally_core::AccountGateway;
use tally_domain::{Account, CallOutcome, FailureDetail};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One recorded gateway invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ListIds,
    Get(Uuid),
    Create(Uuid),
    Update(Uuid),
    Delete(Uuid),
}

#[derive(Default)]
struct Scripts {
    list_ids: VecDeque<CallOutcome<Vec<Uuid>>>,
    get: HashMap<Uuid, VecDeque<CallOutcome<Account>>>,
    create: HashMap<Uuid, VecDeque<CallOutcome<Account>>>,
    update: HashMap<Uuid, VecDeque<CallOutcome<Account>>>,
    delete: HashMap<Uuid, VecDeque<CallOutcome<()>>>,
}

#[derive(Default)]
pub struct InMemoryGateway {
    accounts: Mutex<Vec<Account>>,
    /// Ids listed in addition to stored accounts (ids the server knows about
    /// but has no record for)
    extra_ids: Mutex<Vec<Uuid>>,
    scripts: Mutex<Scripts>,
    calls: Mutex<Vec<Call>>,
    /// Token cancelled after this many calls, to simulate shutdown mid-cycle
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, id: Uuid, counter: u32) -> Self {
        self.accounts.lock().push(Account::new(id, counter));
        self
    }

    /// List `id` without storing an account for it
    pub fn with_listed_id(self, id: Uuid) -> Self {
        self.extra_ids.lock().push(id);
        self
    }

    pub fn counter(&self, id: Uuid) -> Option<u32> {
        self.accounts.lock().iter().find(|account| account.id == id).map(|account| account.counter)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock() = Some((calls, token));
    }

    pub fn script_list_ids(&self, outcome: CallOutcome<Vec<Uuid>>) {
        self.scripts.lock().list_ids.push_back(outcome);
    }

    pub fn script_get(&self, id: Uuid, outcome: CallOutcome<Account>) {
        self.scripts.lock().get.entry(id).or_default().push_back(outcome);
    }

    pub fn script_create(&self, id: Uuid, outcome: CallOutcome<Account>) {
        self.scripts.lock().create.entry(id).or_default().push_back(outcome);
    }

    pub fn script_update(&self, id: Uuid, outcome: CallOutcome<Account>) {
        self.scripts.lock().update.entry(id).or_default().push_back(outcome);
    }

    pub fn script_delete(&self, id: Uuid, outcome: CallOutcome<()>) {
        self.scripts.lock().delete.entry(id).or_default().push_back(outcome);
    }

    fn record(&self, call: Call) {
        let count = {
            let mut calls = self.calls.lock();
            calls.push(call);
            calls.len()
        };
        if let Some((limit, token)) = self.cancel_after.lock().as_ref() {
            if count >= *limit {
                token.cancel();
            }
        }
    }

    fn scripted<T>(
        queue: impl FnOnce(&mut Scripts) -> Option<&mut VecDeque<CallOutcome<T>>>,
        scripts: &Mutex<Scripts>,
    ) -> Option<CallOutcome<T>> {
        let mut scripts = scripts.lock();
        queue(&mut scripts).and_then(VecDeque::pop_front)
    }
}

pub fn transient(message: &str) -> FailureDetail {
    FailureDetail::new(message).with_status(503)
}

#[async_trait]
impl AccountGateway for InMemoryGateway {
    async fn list_ids(&self, _cancel: &CancellationToken) -> CallOutcome<Vec<Uuid>> {
        self.record(Call::ListIds);
        if let Some(outcome) = Self::scripted(|s| Some(&mut s.list_ids), &self.scripts) {
            return outcome;
        }
        let mut ids: Vec<Uuid> = self.accounts.lock().iter().map(|account| account.id).collect();
        for id in self.extra_ids.lock().iter() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        CallOutcome::Success(ids)
    }

    async fn get(&self, id: Uuid, _cancel: &CancellationToken) -> CallOutcome<Account> {
        self.record(Call::Get(id));
        if let Some(outcome) = Self::scripted(|s| s.get.get_mut(&id), &self.scripts) {
            return outcome;
        }
        self.accounts
            .lock()
            .iter()
            .find(|account| account.id == id)
            .copied()
            .map_or(CallOutcome::NotFound, CallOutcome::Success)
    }

    async fn create(&self, id: Uuid, _cancel: &CancellationToken) -> CallOutcome<Account> {
        self.record(Call::Create(id));
        if let Some(outcome) = Self::scripted(|s| s.create.get_mut(&id), &self.scripts) {
            return outcome;
        }
        let mut accounts = self.accounts.lock();
        if accounts.iter().any(|account| account.id == id) {
            return CallOutcome::PermanentFailure(
                FailureDetail::new("account already exists").with_status(409),
            );
        }
        let account = Account::new(id, 0);
        accounts.push(account);
        CallOutcome::Success(account)
    }

    async fn update(&self, id: Uuid, _cancel: &CancellationToken) -> CallOutcome<Account> {
        self.record(Call::Update(id));
        if let Some(outcome) = Self::scripted(|s| s.update.get_mut(&id), &self.scripts) {
            return outcome;
        }
        let mut accounts = self.accounts.lock();
        match accounts.iter_mut().find(|account| account.id == id) {
            Some(account) => {
                account.counter += 1;
                CallOutcome::Success(*account)
            }
            None => CallOutcome::PermanentFailure(
                FailureDetail::new("account not found").with_status(404),
            ),
        }
    }

    async fn delete(&self, id: Uuid, _cancel: &CancellationToken) -> CallOutcome<()> {
        self.record(Call::Delete(id));
        if let Some(outcome) = Self::scripted(|s| s.delete.get_mut(&id), &self.scripts) {
            return outcome;
        }
        let mut accounts = self.accounts.lock();
        let before = accounts.len();
        accounts.retain(|account| account.id != id);
        if accounts.len() < before {
            CallOutcome::Success(())
        } else {
            CallOutcome::PermanentFailure(FailureDetail::new("account not found").with_status(404))
        }
    }
}
