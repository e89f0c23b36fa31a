#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use ticsync_core::{
    Clock, EntityStore, GenerateRemote, KeyValueStore, ManualClock, Mutation, PersistenceError,
    Recommendation, RecommendationInput, RecommendationPatch, Record, RecordId, RemoteClient,
    RemoteError, RemoteResult, SessionIdentity, StoreConfig, TicLog, TicLogInput, TicLogPatch,
    TimeOfDay, UserId,
};

pub const USER: &str = "user-1";

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn clock() -> Rc<ManualClock> {
    Rc::new(ManualClock::new(t0()))
}

pub fn unreachable() -> RemoteError {
    RemoteError::Unreachable("connection refused".to_string())
}

pub fn tic_input(tic_type_id: &str, intensity: u8) -> TicLogInput {
    TicLogInput {
        tic_type_id: tic_type_id.to_string(),
        intensity,
        time_of_day: TimeOfDay::Morning,
        notes: String::new(),
    }
}

pub fn recommendation_input(tic_type_id: &str, title: &str) -> RecommendationInput {
    RecommendationInput {
        tic_type_id: tic_type_id.to_string(),
        title: title.to_string(),
        description: "breathe slowly".to_string(),
        category: "relaxation".to_string(),
    }
}

/// Lets the fake server assign ids and apply patches.
pub trait ServerSide: Record {
    fn with_id(self, id: RecordId) -> Self;
    fn patched(self, patch: &Self::Patch) -> Self;
}

impl ServerSide for TicLog {
    fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    fn patched(mut self, patch: &TicLogPatch) -> Self {
        if let Some(tic_type_id) = &patch.tic_type_id {
            self.tic_type_id = tic_type_id.clone();
        }
        if let Some(intensity) = patch.intensity {
            self.intensity = intensity;
        }
        if let Some(time_of_day) = patch.time_of_day {
            self.time_of_day = time_of_day;
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        self
    }
}

impl ServerSide for Recommendation {
    fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    fn patched(mut self, patch: &RecommendationPatch) -> Self {
        if let Some(helpful) = patch.helpful {
            self.helpful = Some(helpful);
        }
        if let Some(notes) = &patch.feedback_notes {
            self.feedback_notes = Some(notes.clone());
        }
        if let Some(last_used_date) = patch.last_used_date {
            self.last_used_date = last_used_date;
        }
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub reads: usize,
    pub batches: usize,
}

/// In-process remote with scripted failures and optional gates on creates.
pub struct FakeRemote<R: ServerSide> {
    clock: Rc<ManualClock>,
    server: RefCell<BTreeMap<RecordId, R>>,
    next_id: Cell<u32>,
    calls: Cell<Calls>,
    failure: RefCell<Option<RemoteError>>,
    scripted: RefCell<VecDeque<RemoteResult<()>>>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
}

impl<R: ServerSide> FakeRemote<R> {
    pub fn new(clock: Rc<ManualClock>) -> Rc<Self> {
        Rc::new(Self {
            clock,
            server: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
            calls: Cell::new(Calls::default()),
            failure: RefCell::new(None),
            scripted: RefCell::new(VecDeque::new()),
            gates: RefCell::new(VecDeque::new()),
        })
    }

    /// Every call fails with `err` until `heal` is called.
    pub fn fail_with(&self, err: RemoteError) {
        *self.failure.borrow_mut() = Some(err);
    }

    pub fn heal(&self) {
        *self.failure.borrow_mut() = None;
    }

    /// Queues per-call outcomes consumed before the standing failure mode.
    pub fn script(&self, outcomes: Vec<RemoteResult<()>>) {
        self.scripted.borrow_mut().extend(outcomes);
    }

    /// Makes the next `submit_create` wait until the returned sender fires.
    pub fn gate_next_create(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().push_back(rx);
        tx
    }

    pub fn seed(&self, records: Vec<R>) {
        let mut server = self.server.borrow_mut();
        for record in records {
            server.insert(record.id().clone(), record);
        }
    }

    pub fn server_records(&self) -> Vec<R> {
        self.server.borrow().values().cloned().collect()
    }

    pub fn calls(&self) -> Calls {
        self.calls.get()
    }

    fn count(&self, bump: impl FnOnce(&mut Calls)) {
        let mut calls = self.calls.get();
        bump(&mut calls);
        self.calls.set(calls);
    }

    fn outcome(&self) -> RemoteResult<()> {
        if let Some(next) = self.scripted.borrow_mut().pop_front() {
            return next;
        }
        match &*self.failure.borrow() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn assign(&self, record: R) -> R {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let confirmed = record.with_id(RecordId::new(format!("srv-{n}")));
        self.server
            .borrow_mut()
            .insert(confirmed.id().clone(), confirmed.clone());
        confirmed
    }
}

#[async_trait(?Send)]
impl<R: ServerSide> RemoteClient<R> for FakeRemote<R> {
    async fn submit_create(&self, draft: &R) -> RemoteResult<R> {
        self.count(|calls| calls.creates += 1);
        let gate = self.gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.outcome()?;
        Ok(self.assign(draft.clone()))
    }

    async fn submit_update(&self, id: &RecordId, patch: &R::Patch) -> RemoteResult<R> {
        self.count(|calls| calls.updates += 1);
        self.outcome()?;
        let current = self.server.borrow().get(id).cloned();
        let Some(current) = current else {
            return Err(RemoteError::Rejected {
                status: 404,
                message: "no such record".to_string(),
            });
        };
        let updated = current.patched(patch);
        self.server
            .borrow_mut()
            .insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn submit_delete(&self, id: &RecordId) -> RemoteResult<()> {
        self.count(|calls| calls.deletes += 1);
        self.outcome()?;
        self.server.borrow_mut().remove(id);
        Ok(())
    }

    async fn read_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RemoteResult<Vec<R>> {
        self.count(|calls| calls.reads += 1);
        self.outcome()?;
        Ok(self
            .server
            .borrow()
            .values()
            .filter(|record| record.relevance() >= start && record.relevance() <= end)
            .cloned()
            .collect())
    }

    async fn submit_batch(&self, mutations: &[Mutation<R>]) -> RemoteResult<Vec<R>> {
        self.count(|calls| calls.batches += 1);
        self.outcome()?;
        let now = self.clock.now();
        let mut touched = Vec::new();
        for mutation in mutations {
            if let Mutation::Create { input, .. } = mutation {
                let draft = R::draft(RecordId::local(), UserId::new(USER), input.clone(), now);
                touched.push(self.assign(draft));
            }
        }
        Ok(touched)
    }
}

/// Generates one recommendation per call, numbered per subject.
pub struct FakeGenerator {
    clock: Rc<ManualClock>,
    calls: Cell<usize>,
    contexts: RefCell<Vec<usize>>,
    failure: RefCell<Option<RemoteError>>,
}

impl FakeGenerator {
    pub fn new(clock: Rc<ManualClock>) -> Rc<Self> {
        Rc::new(Self {
            clock,
            calls: Cell::new(0),
            contexts: RefCell::new(Vec::new()),
            failure: RefCell::new(None),
        })
    }

    pub fn fail_with(&self, err: RemoteError) {
        *self.failure.borrow_mut() = Some(err);
    }

    pub fn heal(&self) {
        *self.failure.borrow_mut() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Context sizes seen by each call.
    pub fn contexts(&self) -> Vec<usize> {
        self.contexts.borrow().clone()
    }
}

#[async_trait(?Send)]
impl GenerateRemote<TicLog, Recommendation> for FakeGenerator {
    async fn generate(
        &self,
        subject_id: &str,
        context: &[TicLog],
    ) -> RemoteResult<Vec<Recommendation>> {
        self.calls.set(self.calls.get() + 1);
        self.contexts.borrow_mut().push(context.len());
        if let Some(err) = self.failure.borrow().clone() {
            return Err(err);
        }
        let now = self.clock.now();
        Ok(vec![Recommendation {
            id: RecordId::new(format!("rec-{subject_id}-{}", self.calls.get())),
            user_id: UserId::new(USER),
            tic_type_id: subject_id.to_string(),
            title: "Competing response".to_string(),
            description: "Tense the opposing muscle".to_string(),
            category: "behavioral".to_string(),
            helpful: None,
            feedback_notes: None,
            last_used_date: now,
            created_at: now,
        }])
    }
}

/// Storage whose every call fails.
pub struct BrokenStorage;

impl KeyValueStore for BrokenStorage {
    fn load(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
        Err(PersistenceError::Unavailable("disk detached".to_string()))
    }

    fn save(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("disk detached".to_string()))
    }
}

/// Future that returns `Pending` once, waking itself.
pub struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

pub fn yield_now() -> YieldNow {
    YieldNow(false)
}

pub fn signed_in() -> Rc<SessionIdentity> {
    Rc::new(SessionIdentity::signed_in(UserId::new(USER)))
}

pub fn store_with<R: ServerSide>(
    remote: Rc<FakeRemote<R>>,
    identity: Rc<SessionIdentity>,
    clock: Rc<ManualClock>,
) -> Rc<EntityStore<R>> {
    configured_store(remote, identity, clock, StoreConfig::for_record::<R>())
}

pub fn configured_store<R: ServerSide>(
    remote: Rc<FakeRemote<R>>,
    identity: Rc<SessionIdentity>,
    clock: Rc<ManualClock>,
    config: StoreConfig,
) -> Rc<EntityStore<R>> {
    Rc::new(EntityStore::new(remote, identity, clock, config))
}

pub fn advance(clock: &ManualClock, minutes: i64) {
    clock.advance(TimeDelta::minutes(minutes));
}
