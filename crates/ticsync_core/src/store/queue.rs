//! Durable queue of mutations awaiting retry, and its drain loop.
//!
//! # Responsibility
//! - Keep failed mutations in enqueue order.
//! - Replay a fixed snapshot of them, removing each one that confirms.
//!
//! # Invariants
//! - At most one entry per logical key: re-enqueueing replaces in place.
//! - A drain only ever removes ops that were in its starting snapshot.
//! - The draining flag is released on every exit path of a drain.

use crate::model::record::Record;
use crate::store::error::StoreError;
use crate::store::mutation::PendingOperation;
use log::{debug, info, warn};
use std::future::Future;
use std::marker::PhantomData;
use uuid::Uuid;

/// Result of an `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Appended,
    /// An older attempt of the same logical change was superseded.
    Replaced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationQueue<R: Record> {
    ops: Vec<PendingOperation<R>>,
    draining: bool,
}

impl<R: Record> Default for OperationQueue<R> {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            draining: false,
        }
    }
}

impl<R: Record> OperationQueue<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation<R>> {
        self.ops.iter()
    }

    pub fn contains(&self, op_id: Uuid) -> bool {
        self.ops.iter().any(|op| op.op_id == op_id)
    }

    /// Copy of the queue contents in enqueue order.
    pub fn snapshot(&self) -> Vec<PendingOperation<R>> {
        self.ops.clone()
    }

    /// Adds an op, replacing any queued attempt of the same logical change.
    pub fn enqueue(&mut self, op: PendingOperation<R>) -> Enqueued {
        let key = op.logical_key();
        match self.ops.iter_mut().find(|queued| queued.logical_key() == key) {
            Some(slot) => {
                *slot = op;
                Enqueued::Replaced
            }
            None => {
                self.ops.push(op);
                Enqueued::Appended
            }
        }
    }

    pub fn remove(&mut self, op_id: Uuid) -> bool {
        let before = self.ops.len();
        self.ops.retain(|op| op.op_id != op_id);
        self.ops.len() != before
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub(crate) fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
    }
}

/// Queue access a drain needs from the store that owns the queue.
pub trait QueueHost<R: Record> {
    /// Raises the draining flag and returns the queue snapshot, or `None`
    /// when a drain is already in flight.
    fn begin_drain(&self) -> Option<Vec<PendingOperation<R>>>;
    /// Removes one op that no longer needs replaying.
    fn settle(&self, op_id: Uuid);
    fn end_drain(&self);
}

/// Counters for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Ops in the starting snapshot.
    pub snapshot: usize,
    pub attempted: usize,
    pub confirmed: usize,
    /// Ops dropped because their replay can never succeed.
    pub discarded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was in flight; nothing happened.
    Skipped,
    /// Every snapshot op was confirmed or discarded.
    Completed(DrainReport),
    /// A retryable failure stopped the pass; later ops stay queued.
    Halted {
        report: DrainReport,
        error: StoreError,
    },
}

struct DrainGuard<'a, R: Record, H: QueueHost<R> + ?Sized> {
    host: &'a H,
    _record: PhantomData<R>,
}

impl<R: Record, H: QueueHost<R> + ?Sized> Drop for DrainGuard<'_, R, H> {
    fn drop(&mut self) {
        self.host.end_drain();
    }
}

/// Replays every op queued at call time, in enqueue order.
///
/// A spurious call while a drain is in flight returns `Skipped` immediately.
/// Ops enqueued during the pass are left for the next drain.
pub async fn drain_into<R, H, F, Fut>(host: &H, mut replay: F) -> DrainOutcome
where
    R: Record,
    H: QueueHost<R> + ?Sized,
    F: FnMut(PendingOperation<R>) -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let Some(snapshot) = host.begin_drain() else {
        debug!("event=queue_drain module=queue status=skip kind={} reason=in_flight", R::KIND);
        return DrainOutcome::Skipped;
    };
    let _guard = DrainGuard {
        host,
        _record: PhantomData,
    };

    let mut report = DrainReport {
        snapshot: snapshot.len(),
        ..DrainReport::default()
    };
    info!(
        "event=queue_drain module=queue status=start kind={} ops={}",
        R::KIND,
        report.snapshot
    );

    for op in snapshot {
        let op_id = op.op_id;
        let op_kind = op.kind();
        report.attempted += 1;
        match replay(op).await {
            Ok(()) => {
                host.settle(op_id);
                report.confirmed += 1;
            }
            Err(err) if !err.is_retryable() => {
                warn!(
                    "event=queue_replay module=queue status=discard kind={} op_kind={} error_code={}",
                    R::KIND,
                    op_kind.as_str(),
                    err.code()
                );
                host.settle(op_id);
                report.discarded += 1;
            }
            Err(err) => {
                warn!(
                    "event=queue_drain module=queue status=error kind={} op_kind={} attempted={} error_code={}",
                    R::KIND,
                    op_kind.as_str(),
                    report.attempted,
                    err.code()
                );
                return DrainOutcome::Halted { report, error: err };
            }
        }
    }

    info!(
        "event=queue_drain module=queue status=ok kind={} confirmed={} discarded={}",
        R::KIND,
        report.confirmed,
        report.discarded
    );
    DrainOutcome::Completed(report)
}
