//! Store state and the pure reducer that evolves it.
//!
//! # Responsibility
//! - Hold every field of one entity store as a plain value.
//! - Apply one `Action` at a time, returning the next state.
//!
//! # Invariants
//! - `recent` never exceeds `RECENT_LIMIT` and is newest first.
//! - Every id in `recent` is also a key of `entities`.
//! - A rolled-back create leaves `recent` exactly as it was before the
//!   optimistic insert.
//! - `ConfirmCreate` swaps the optimistic id for the server id in one step.

use crate::model::record::{Record, RecordId};
use crate::persist::snapshot::Snapshot;
use crate::store::mutation::PendingOperation;
use crate::store::queue::OperationQueue;
use crate::store::range_cache::{RangeCache, RangeKey};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Maximum length of the recent-records projection.
pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreState<R: Record> {
    /// Primary mapping, keyed by record id.
    pub entities: HashMap<RecordId, R>,
    /// Most recently created records, newest first.
    pub recent: Vec<R>,
    pub cache: RangeCache<R>,
    pub queue: OperationQueue<R>,
    /// Sticky user-visible error; last write wins.
    pub error: Option<String>,
    /// Remote calls currently awaiting a response.
    pub in_flight: usize,
    pub last_sync: Option<DateTime<Utc>>,
    /// Last derived generation per subject id.
    pub last_generated: BTreeMap<String, DateTime<Utc>>,
    /// Entries pushed out of `recent` by unconfirmed creates, latest first.
    pub displaced: Vec<R>,
}

impl<R: Record> Default for StoreState<R> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
            recent: Vec::new(),
            cache: RangeCache::new(),
            queue: OperationQueue::new(),
            error: None,
            in_flight: 0,
            last_sync: None,
            last_generated: BTreeMap::new(),
            displaced: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action<R: Record> {
    /// Inserts an unconfirmed record and puts it at the head of `recent`.
    InsertOptimistic(R),
    ConfirmCreate { local_id: RecordId, confirmed: R },
    RollbackCreate { local_id: RecordId },
    /// Inserts confirmed records created elsewhere (batch submit).
    InsertConfirmed(Vec<R>),
    /// Replaces a stored record with its server version.
    Replace(R),
    Remove(RecordId),
    /// Upserts records. New ids enter `recent` newest first; known ids are
    /// replaced in place.
    Merge(Vec<R>),
    CacheRange {
        key: RangeKey,
        payload: Vec<R>,
        cached_at: DateTime<Utc>,
    },
    PurgeCache { now: DateTime<Utc>, ttl: TimeDelta },
    Enqueue(PendingOperation<R>),
    Settle(Uuid),
    BeginDrain,
    EndDrain,
    RequestStarted,
    RequestFinished,
    SetError(String),
    ClearError,
    MarkSynced(DateTime<Utc>),
    MarkGenerated { subject_id: String, at: DateTime<Utc> },
    Restore(Snapshot<R>),
    Reset,
}

/// Applies one action to `state`, returning the next state.
pub fn reduce<R: Record>(mut state: StoreState<R>, action: Action<R>) -> StoreState<R> {
    match action {
        Action::InsertOptimistic(record) => {
            state.entities.insert(record.id().clone(), record.clone());
            if let Some(dropped) = push_recent(&mut state.recent, record) {
                state.displaced.insert(0, dropped);
            }
        }
        Action::ConfirmCreate {
            local_id,
            confirmed,
        } => {
            state.entities.remove(&local_id);
            state
                .entities
                .insert(confirmed.id().clone(), confirmed.clone());
            let confirmed_id = confirmed.id().clone();
            if confirmed_id != local_id {
                state.recent.retain(|record| record.id() != &confirmed_id);
            }
            if let Some(slot) = state.recent.iter_mut().find(|record| record.id() == &local_id) {
                *slot = confirmed;
            }
            forget_displaced_when_settled(&mut state);
        }
        Action::RollbackCreate { local_id } => {
            state.entities.remove(&local_id);
            state.recent.retain(|record| record.id() != &local_id);
            restore_displaced(&mut state);
            forget_displaced_when_settled(&mut state);
        }
        Action::InsertConfirmed(records) => {
            for record in records {
                state.entities.insert(record.id().clone(), record.clone());
                push_recent(&mut state.recent, record);
            }
        }
        Action::Replace(record) => {
            replace_in_recent(&mut state.recent, &record);
            state.entities.insert(record.id().clone(), record);
        }
        Action::Remove(id) => {
            state.entities.remove(&id);
            let before = state.recent.len();
            state.recent.retain(|record| record.id() != &id);
            if state.recent.len() != before {
                backfill_recent(&mut state);
            }
        }
        Action::Merge(records) => {
            let mut fresh = Vec::new();
            for record in records {
                if state.entities.contains_key(record.id()) {
                    replace_in_recent(&mut state.recent, &record);
                } else {
                    fresh.push(record.clone());
                }
                state.entities.insert(record.id().clone(), record);
            }
            fresh.sort_by(|a, b| {
                a.relevance()
                    .cmp(&b.relevance())
                    .then_with(|| b.id().cmp(a.id()))
            });
            for record in fresh {
                push_recent(&mut state.recent, record);
            }
        }
        Action::CacheRange {
            key,
            payload,
            cached_at,
        } => state.cache.store(key, payload, cached_at),
        Action::PurgeCache { now, ttl } => {
            state.cache.purge_expired(now, ttl);
        }
        Action::Enqueue(op) => {
            state.queue.enqueue(op);
        }
        Action::Settle(op_id) => {
            state.queue.remove(op_id);
        }
        Action::BeginDrain => state.queue.set_draining(true),
        Action::EndDrain => state.queue.set_draining(false),
        Action::RequestStarted => state.in_flight += 1,
        Action::RequestFinished => state.in_flight = state.in_flight.saturating_sub(1),
        Action::SetError(message) => state.error = Some(message),
        Action::ClearError => state.error = None,
        Action::MarkSynced(at) => state.last_sync = Some(at),
        Action::MarkGenerated { subject_id, at } => {
            state.last_generated.insert(subject_id, at);
        }
        Action::Restore(snapshot) => {
            let draining = state.queue.is_draining();
            state = StoreState::default();
            state.queue.set_draining(draining);
            for record in snapshot.entities {
                if !record.id().is_local() {
                    state.entities.insert(record.id().clone(), record);
                }
            }
            for op in snapshot.queue {
                state.queue.enqueue(op);
            }
            state.last_sync = snapshot.last_sync;
            state.last_generated = snapshot.last_generated;
            backfill_recent(&mut state);
        }
        Action::Reset => {
            // The drain guard owns the draining flag until it drops.
            let draining = state.queue.is_draining();
            state = StoreState::default();
            state.queue.set_draining(draining);
        }
    }
    state
}

/// Prepends `record`; returns the entry that fell off the end, if any.
fn push_recent<R: Record>(recent: &mut Vec<R>, record: R) -> Option<R> {
    recent.retain(|existing| existing.id() != record.id());
    recent.insert(0, record);
    if recent.len() > RECENT_LIMIT {
        recent.pop()
    } else {
        None
    }
}

/// Puts entries displaced by optimistic inserts back at the tail of `recent`,
/// latest displacement first, using their current stored version.
fn restore_displaced<R: Record>(state: &mut StoreState<R>) {
    while state.recent.len() < RECENT_LIMIT && !state.displaced.is_empty() {
        let candidate = state.displaced.remove(0);
        let shown = state
            .recent
            .iter()
            .any(|record| record.id() == candidate.id());
        if shown {
            continue;
        }
        if let Some(current) = state.entities.get(candidate.id()) {
            state.recent.push(current.clone());
        }
    }
}

fn forget_displaced_when_settled<R: Record>(state: &mut StoreState<R>) {
    if !state.entities.keys().any(RecordId::is_local) {
        state.displaced.clear();
    }
}

fn replace_in_recent<R: Record>(recent: &mut [R], record: &R) {
    for slot in recent.iter_mut().filter(|slot| slot.id() == record.id()) {
        *slot = record.clone();
    }
}

/// Refills `recent` up to the limit with the most relevant records not in it.
fn backfill_recent<R: Record>(state: &mut StoreState<R>) {
    if state.recent.len() >= RECENT_LIMIT {
        return;
    }
    let mut candidates = state
        .entities
        .values()
        .filter(|record| !state.recent.iter().any(|shown| shown.id() == record.id()))
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| {
        b.relevance()
            .cmp(&a.relevance())
            .then_with(|| a.id().cmp(b.id()))
    });
    let missing = RECENT_LIMIT - state.recent.len();
    let fill = candidates
        .into_iter()
        .take(missing)
        .cloned()
        .collect::<Vec<_>>();
    state.recent.extend(fill);
}
