//! Sync coordinator for one entity store.
//!
//! # Responsibility
//! - Replay queued mutations through `EntityStore::apply`.
//! - Stamp `last_sync` after a complete drain and persist the snapshot.
//! - Run rate-limited derived generation.
//!
//! # Invariants
//! - `last_sync` only moves after a drain that left no retryable failure.
//! - Requests inside the generation cooldown are dropped, not deferred.
//! - Storage errors never reach callers.

use crate::model::record::Record;
use crate::persist::snapshot::Snapshot;
use crate::persist::KeyValueStore;
use crate::ports::remote::GenerateRemote;
use crate::store::entity_store::{EntityStore, RangeReader};
use crate::store::error::StoreResult;
use crate::store::mutation::PendingOperation;
use crate::store::queue::{drain_into, DrainOutcome};
use crate::sync::derive::{Deriver, RecentWindowDeriver};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Result of a `generate_derived` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Remote generation ran; carries the number of merged records.
    Generated(usize),
    /// The subject was generated less than one cooldown ago.
    CoolingDown,
    /// A generation for the same subject is already awaiting the remote.
    InFlight,
    /// No deriver was configured for this coordinator.
    Unavailable,
}

pub struct SyncCoordinator<R: Record> {
    store: Rc<EntityStore<R>>,
    storage: Rc<dyn KeyValueStore>,
    deriver: Option<Rc<dyn Deriver<R>>>,
    generating: RefCell<BTreeSet<String>>,
}

impl<R: Record> SyncCoordinator<R> {
    pub fn new(store: Rc<EntityStore<R>>, storage: Rc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            storage,
            deriver: None,
            generating: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn with_deriver(mut self, deriver: Rc<dyn Deriver<R>>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    /// Derives from the sibling store `source` over this store's configured
    /// derivation window.
    pub fn with_recent_window<C: Record>(
        self,
        source: Rc<dyn RangeReader<C>>,
        remote: Rc<dyn GenerateRemote<C, R>>,
    ) -> Self {
        let window = self.store.config().derivation_window();
        self.with_deriver(Rc::new(RecentWindowDeriver::new(source, remote, window)))
    }

    pub fn store(&self) -> &Rc<EntityStore<R>> {
        &self.store
    }

    fn storage_key(&self) -> &str {
        &self.store.config().storage_key
    }

    /// Loads the persisted snapshot into the store.
    ///
    /// Returns `false` when nothing usable was found; the store then keeps
    /// its current (initially empty) state.
    pub fn restore(&self) -> bool {
        let key = self.storage_key();
        let text = match self.storage.load(key) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(
                    "event=snapshot_restore module=sync status=skip kind={} reason=missing",
                    R::KIND
                );
                return false;
            }
            Err(err) => {
                warn!(
                    "event=snapshot_restore module=sync status=error kind={} error_code=load_failed error={}",
                    R::KIND,
                    err
                );
                return false;
            }
        };

        match Snapshot::<R>::decode(&text) {
            Ok(snapshot) => {
                info!(
                    "event=snapshot_restore module=sync status=ok kind={} entities={} queued={}",
                    R::KIND,
                    snapshot.entities.len(),
                    snapshot.queue.len()
                );
                self.store.restore(snapshot);
                true
            }
            Err(err) => {
                warn!(
                    "event=snapshot_restore module=sync status=error kind={} error_code=decode_failed error={}",
                    R::KIND,
                    err
                );
                false
            }
        }
    }

    /// Writes the durable snapshot. Failures are logged and swallowed.
    pub fn persist(&self) {
        let encoded = match self.store.snapshot().encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(
                    "event=snapshot_persist module=sync status=error kind={} error_code=encode_failed error={}",
                    R::KIND,
                    err
                );
                return;
            }
        };
        match self.storage.save(self.storage_key(), &encoded) {
            Ok(()) => debug!(
                "event=snapshot_persist module=sync status=ok kind={} bytes={}",
                R::KIND,
                encoded.len()
            ),
            Err(err) => warn!(
                "event=snapshot_persist module=sync status=error kind={} error_code=save_failed error={}",
                R::KIND,
                err
            ),
        }
    }

    /// Drains the store's operation queue once.
    ///
    /// # Contract
    /// - No-op (`Skipped`) while another drain is in flight.
    /// - Clears the store error on entry.
    /// - `Completed`: stamps `last_sync` and persists.
    /// - `Halted`: sets the store error, keeps `last_sync`, persists the
    ///   ops confirmed so far.
    pub async fn sync_pending(&self) -> DrainOutcome {
        if self.store.is_draining() {
            debug!(
                "event=sync_pending module=sync status=skip kind={} reason=in_flight",
                R::KIND
            );
            return DrainOutcome::Skipped;
        }
        self.store.clear_error();

        let store = &*self.store;
        let outcome = drain_into(store, |op: PendingOperation<R>| store.apply(op.mutation)).await;

        match &outcome {
            DrainOutcome::Skipped => {}
            DrainOutcome::Completed(report) => {
                let synced_at = self.store.now();
                self.store.mark_synced(synced_at);
                info!(
                    "event=sync_pending module=sync status=ok kind={} confirmed={} discarded={} synced_at={}",
                    R::KIND,
                    report.confirmed,
                    report.discarded,
                    synced_at.to_rfc3339()
                );
                self.persist();
            }
            DrainOutcome::Halted { report, error } => {
                warn!(
                    "event=sync_pending module=sync status=error kind={} confirmed={} remaining={} error_code={}",
                    R::KIND,
                    report.confirmed,
                    self.store.queue_len(),
                    error.code()
                );
                self.store.set_error(format!("sync halted: {error}"));
                self.persist();
            }
        }
        outcome
    }

    /// Regenerates derived records for `subject_id`, at most once per cooldown.
    ///
    /// # Errors
    /// - Context read or remote generation failures set the store error and
    ///   leave the cooldown unstamped.
    pub async fn generate_derived(&self, subject_id: &str) -> StoreResult<GenerationOutcome> {
        let Some(deriver) = self.deriver.clone() else {
            warn!(
                "event=generate_derived module=sync status=skip kind={} reason=no_deriver",
                R::KIND
            );
            return Ok(GenerationOutcome::Unavailable);
        };

        let now = self.store.now();
        if let Some(last) = self.store.last_generated(subject_id) {
            if now - last < self.store.config().generation_cooldown() {
                debug!(
                    "event=generate_derived module=sync status=skip kind={} reason=cooldown",
                    R::KIND
                );
                return Ok(GenerationOutcome::CoolingDown);
            }
        }
        let claimed = self.generating.borrow_mut().insert(subject_id.to_string());
        if !claimed {
            return Ok(GenerationOutcome::InFlight);
        }

        let result = deriver.derive(subject_id, now).await;
        self.generating.borrow_mut().remove(subject_id);

        match result {
            Ok(records) => {
                let count = records.len();
                self.store.merge(records);
                self.store.mark_generated(subject_id, self.store.now());
                info!(
                    "event=generate_derived module=sync status=ok kind={} generated={}",
                    R::KIND,
                    count
                );
                self.persist();
                Ok(GenerationOutcome::Generated(count))
            }
            Err(err) => {
                warn!(
                    "event=generate_derived module=sync status=error kind={} error_code={}",
                    R::KIND,
                    err.code()
                );
                self.store.set_error(err.to_string());
                Err(err)
            }
        }
    }
}
