//! Entity store for one record kind.
//!
//! # Responsibility
//! - Expose create/update/delete/feedback with the optimistic-then-confirm
//!   protocol, plus cached range reads.
//! - Hand failed mutations to the operation queue.
//! - Serve as the replay entry point for queue drains.
//!
//! # Invariants
//! - `create` is optimistic; `update`, `delete` and feedback write through
//!   only after remote confirmation.
//! - Each confirmation touches only its own client-local id, so concurrent
//!   creates may confirm in any order.
//! - `Unauthenticated`, `NotFound` and `Validation` leave state untouched.

use crate::model::record::{Record, RecordId};
use crate::persist::snapshot::Snapshot;
use crate::ports::clock::Clock;
use crate::ports::identity::IdentityProvider;
use crate::ports::remote::{RemoteClient, RemoteResult};
use crate::store::config::StoreConfig;
use crate::store::error::{StoreError, StoreResult};
use crate::store::mutation::{Mutation, PendingOperation};
use crate::store::queue::QueueHost;
use crate::store::range_cache::RangeKey;
use crate::store::state::{reduce, Action, StoreState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use uuid::Uuid;

/// Read-only range port handed to sibling components.
///
/// Gives cross-store readers range access without exposing the mapping.
#[async_trait(?Send)]
pub trait RangeReader<R: Record> {
    async fn read_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<R>>;
}

/// Local store of one record kind, built with injected collaborators.
pub struct EntityStore<R: Record> {
    state: RefCell<StoreState<R>>,
    remote: Rc<dyn RemoteClient<R>>,
    identity: Rc<dyn IdentityProvider>,
    clock: Rc<dyn Clock>,
    config: StoreConfig,
}

impl<R: Record> EntityStore<R> {
    pub fn new(
        remote: Rc<dyn RemoteClient<R>>,
        identity: Rc<dyn IdentityProvider>,
        clock: Rc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            state: RefCell::new(StoreState::default()),
            remote,
            identity,
            clock,
            config,
        }
    }

    /// Runs the reducer on the current state. Never holds a borrow afterwards.
    pub(crate) fn dispatch(&self, action: Action<R>) {
        let prior = self.state.take();
        *self.state.borrow_mut() = reduce(prior, action);
    }

    /// Copy of the full current state.
    pub fn state(&self) -> StoreState<R> {
        self.state.borrow().clone()
    }

    /// Durable subset of the current state.
    pub fn snapshot(&self) -> Snapshot<R> {
        Snapshot::capture(&self.state.borrow())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn get(&self, id: &RecordId) -> Option<R> {
        self.state.borrow().entities.get(id).cloned()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.borrow().entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entities.is_empty()
    }

    /// All records, most relevant first.
    pub fn records(&self) -> Vec<R> {
        let mut records = self
            .state
            .borrow()
            .entities
            .values()
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| {
            b.relevance()
                .cmp(&a.relevance())
                .then_with(|| a.id().cmp(b.id()))
        });
        records
    }

    /// Most recently created records, newest first.
    pub fn recent(&self) -> Vec<R> {
        self.state.borrow().recent.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().in_flight > 0
    }

    pub fn queue_len(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation<R>> {
        self.state.borrow().queue.snapshot()
    }

    pub fn is_draining(&self) -> bool {
        self.state.borrow().queue.is_draining()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_sync
    }

    pub fn last_generated(&self, subject_id: &str) -> Option<DateTime<Utc>> {
        self.state.borrow().last_generated.get(subject_id).copied()
    }

    /// Creates a record optimistically, then confirms it remotely.
    ///
    /// # Errors
    /// - `Unauthenticated` / `Validation`: raised before any state change.
    /// - Remote failures: the optimistic row is rolled back, the store error is
    ///   set and a `create` retry carrying the original input is queued.
    pub async fn create(&self, input: R::Input) -> StoreResult<R> {
        self.create_attempt(Uuid::new_v4(), input).await
    }

    async fn create_attempt(&self, client_ref: Uuid, input: R::Input) -> StoreResult<R> {
        let Some(user_id) = self.identity.current_user() else {
            warn!(
                "event=record_create module=store status=error kind={} error_code=unauthenticated",
                R::KIND
            );
            return Err(StoreError::Unauthenticated);
        };
        R::validate_input(&input)?;

        let local_id = RecordId::local();
        let draft = R::draft(local_id.clone(), user_id, input.clone(), self.clock.now());
        self.dispatch(Action::InsertOptimistic(draft.clone()));
        debug!(
            "event=record_create module=store status=start kind={} local_id={}",
            R::KIND,
            local_id
        );

        match self.tracked(self.remote.submit_create(&draft)).await {
            Ok(confirmed) => {
                info!(
                    "event=record_create module=store status=ok kind={} local_id={} id={}",
                    R::KIND,
                    local_id,
                    confirmed.id()
                );
                self.dispatch(Action::ConfirmCreate {
                    local_id,
                    confirmed: confirmed.clone(),
                });
                Ok(confirmed)
            }
            Err(err) => {
                self.dispatch(Action::RollbackCreate { local_id });
                let err = StoreError::from(err);
                self.record_failure("record_create", &err);
                self.enqueue(Mutation::Create { client_ref, input });
                Err(err)
            }
        }
    }

    /// Creates several records in one remote batch, without optimistic rows.
    ///
    /// On failure every input is queued as its own `create` retry.
    pub async fn create_batch(&self, inputs: Vec<R::Input>) -> StoreResult<Vec<R>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if self.identity.current_user().is_none() {
            return Err(StoreError::Unauthenticated);
        }
        for input in &inputs {
            R::validate_input(input)?;
        }

        let mutations = inputs.into_iter().map(Mutation::create).collect::<Vec<_>>();
        match self.tracked(self.remote.submit_batch(&mutations)).await {
            Ok(records) => {
                info!(
                    "event=record_batch module=store status=ok kind={} submitted={} returned={}",
                    R::KIND,
                    mutations.len(),
                    records.len()
                );
                self.dispatch(Action::InsertConfirmed(records.clone()));
                Ok(records)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.record_failure("record_batch", &err);
                for mutation in mutations {
                    self.enqueue(mutation);
                }
                Err(err)
            }
        }
    }

    /// Updates a record after remote confirmation (write-through only).
    ///
    /// A remote failure sets the store error and leaves the record unchanged;
    /// nothing is queued.
    pub async fn update(&self, id: &RecordId, patch: R::Patch) -> StoreResult<R> {
        self.require_present(id, "record_update")?;
        match self.tracked(self.remote.submit_update(id, &patch)).await {
            Ok(updated) => {
                debug!(
                    "event=record_update module=store status=ok kind={} id={}",
                    R::KIND,
                    id
                );
                self.replace_if_present(id, updated.clone());
                Ok(updated)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.record_failure("record_update", &err);
                Err(err)
            }
        }
    }

    /// Deletes a record once the remote confirms; on failure it stays and a
    /// `delete` retry is queued.
    pub async fn delete(&self, id: &RecordId) -> StoreResult<()> {
        match self.tracked(self.remote.submit_delete(id)).await {
            Ok(()) => {
                info!(
                    "event=record_delete module=store status=ok kind={} id={}",
                    R::KIND,
                    id
                );
                self.dispatch(Action::Remove(id.clone()));
                Ok(())
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.record_failure("record_delete", &err);
                self.enqueue(Mutation::Delete { id: id.clone() });
                Err(err)
            }
        }
    }

    /// Records user feedback on a record; queued for retry when the remote fails.
    pub async fn submit_feedback(&self, id: &RecordId, patch: R::Patch) -> StoreResult<R> {
        self.require_present(id, "record_feedback")?;
        match self.tracked(self.remote.submit_update(id, &patch)).await {
            Ok(updated) => {
                info!(
                    "event=record_feedback module=store status=ok kind={} id={}",
                    R::KIND,
                    id
                );
                self.replace_if_present(id, updated.clone());
                Ok(updated)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.record_failure("record_feedback", &err);
                self.enqueue(Mutation::Feedback {
                    id: id.clone(),
                    patch,
                });
                Err(err)
            }
        }
    }

    /// Single mutation entry point shared by callers and queue replay.
    pub async fn apply(&self, mutation: Mutation<R>) -> StoreResult<()> {
        match mutation {
            Mutation::Create { client_ref, input } => {
                self.create_attempt(client_ref, input).await.map(|_| ())
            }
            Mutation::Update { id, patch } => self.update(&id, patch).await.map(|_| ()),
            Mutation::Delete { id } => self.delete(&id).await,
            Mutation::Feedback { id, patch } => self.submit_feedback(&id, patch).await.map(|_| ()),
        }
    }

    /// Queues a mutation for the next sync without attempting it now.
    pub fn defer(&self, mutation: Mutation<R>) {
        self.enqueue(mutation);
    }

    /// Reads records in `[start, end]`, served from the range cache when fresh.
    ///
    /// Cached ranges are not invalidated by local mutations.
    ///
    /// # Errors
    /// - Remote failures set the store error and are returned as-is, so an
    ///   empty `Ok` always means a genuinely empty range.
    pub async fn read_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<R>> {
        let key = RangeKey::normalized(start, end);
        let cached = self
            .state
            .borrow()
            .cache
            .lookup(&key, self.clock.now(), self.config.cache_ttl())
            .map(<[R]>::to_vec);
        if let Some(records) = cached {
            debug!(
                "event=range_read module=store status=ok kind={} source=cache count={}",
                R::KIND,
                records.len()
            );
            return Ok(records);
        }

        let (from, to) = key.bounds();
        match self.tracked(self.remote.read_range(from, to)).await {
            Ok(records) => {
                debug!(
                    "event=range_read module=store status=ok kind={} source=remote count={}",
                    R::KIND,
                    records.len()
                );
                self.dispatch(Action::CacheRange {
                    key,
                    payload: records.clone(),
                    cached_at: self.clock.now(),
                });
                Ok(records)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.record_failure("range_read", &err);
                Err(err)
            }
        }
    }

    /// Drops expired range-cache entries; returns how many were dropped.
    pub fn purge_expired_cache(&self) -> usize {
        let before = self.state.borrow().cache.len();
        self.dispatch(Action::PurgeCache {
            now: self.clock.now(),
            ttl: self.config.cache_ttl(),
        });
        before - self.state.borrow().cache.len()
    }

    pub fn clear_error(&self) {
        self.dispatch(Action::ClearError);
    }

    /// Restores every in-memory field to its initial value. Storage is untouched.
    pub fn reset(&self) {
        self.dispatch(Action::Reset);
    }

    pub(crate) fn set_error(&self, message: String) {
        self.dispatch(Action::SetError(message));
    }

    pub(crate) fn merge(&self, records: Vec<R>) {
        self.dispatch(Action::Merge(records));
    }

    pub(crate) fn mark_synced(&self, at: DateTime<Utc>) {
        self.dispatch(Action::MarkSynced(at));
    }

    pub(crate) fn mark_generated(&self, subject_id: &str, at: DateTime<Utc>) {
        self.dispatch(Action::MarkGenerated {
            subject_id: subject_id.to_string(),
            at,
        });
    }

    pub(crate) fn restore(&self, snapshot: Snapshot<R>) {
        self.dispatch(Action::Restore(snapshot));
    }

    async fn tracked<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        self.dispatch(Action::RequestStarted);
        let result = call.await;
        self.dispatch(Action::RequestFinished);
        result
    }

    fn require_present(&self, id: &RecordId, event: &str) -> StoreResult<()> {
        if self.contains(id) {
            return Ok(());
        }
        warn!(
            "event={} module=store status=error kind={} id={} error_code=not_found",
            event,
            R::KIND,
            id
        );
        Err(StoreError::NotFound(id.clone()))
    }

    fn replace_if_present(&self, id: &RecordId, record: R) {
        // A concurrent delete may have confirmed while this call was in flight.
        if self.contains(id) {
            self.dispatch(Action::Replace(record));
        }
    }

    fn record_failure(&self, event: &str, err: &StoreError) {
        warn!(
            "event={} module=store status=error kind={} error_code={}",
            event,
            R::KIND,
            err.code()
        );
        self.set_error(err.to_string());
    }

    fn enqueue(&self, mutation: Mutation<R>) {
        let op = PendingOperation::new(mutation, self.clock.now());
        info!(
            "event=queue_enqueue module=store status=ok kind={} op_kind={} op_id={}",
            R::KIND,
            op.kind().as_str(),
            op.op_id
        );
        self.dispatch(Action::Enqueue(op));
    }
}

impl<R: Record> QueueHost<R> for EntityStore<R> {
    fn begin_drain(&self) -> Option<Vec<PendingOperation<R>>> {
        if self.is_draining() {
            return None;
        }
        self.dispatch(Action::BeginDrain);
        Some(self.pending_operations())
    }

    fn settle(&self, op_id: Uuid) {
        self.dispatch(Action::Settle(op_id));
    }

    fn end_drain(&self) {
        self.dispatch(Action::EndDrain);
    }
}

#[async_trait(?Send)]
impl<R: Record> RangeReader<R> for EntityStore<R> {
    async fn read_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<R>> {
        EntityStore::read_range(self, start, end).await
    }
}
