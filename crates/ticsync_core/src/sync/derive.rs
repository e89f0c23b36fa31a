//! Derived-record generation from a sibling store's recent window.

use crate::model::record::Record;
use crate::ports::remote::GenerateRemote;
use crate::store::entity_store::RangeReader;
use crate::store::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use std::rc::Rc;

/// Produces derived records for one subject.
#[async_trait(?Send)]
pub trait Deriver<R: Record> {
    async fn derive(&self, subject_id: &str, now: DateTime<Utc>) -> StoreResult<Vec<R>>;
}

/// Reads `[now - window, now]` from a sibling store and asks the remote to
/// generate derived records from it. A window reaching past the earliest
/// representable instant starts there.
pub struct RecentWindowDeriver<C: Record, R: Record> {
    source: Rc<dyn RangeReader<C>>,
    remote: Rc<dyn GenerateRemote<C, R>>,
    window: TimeDelta,
}

impl<C: Record, R: Record> RecentWindowDeriver<C, R> {
    pub fn new(
        source: Rc<dyn RangeReader<C>>,
        remote: Rc<dyn GenerateRemote<C, R>>,
        window: TimeDelta,
    ) -> Self {
        Self {
            source,
            remote,
            window,
        }
    }
}

#[async_trait(?Send)]
impl<C: Record, R: Record> Deriver<R> for RecentWindowDeriver<C, R> {
    async fn derive(&self, subject_id: &str, now: DateTime<Utc>) -> StoreResult<Vec<R>> {
        let from = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let context = self.source.read_range(from, now).await?;
        debug!(
            "event=derive_context module=sync status=ok source_kind={} kind={} context={}",
            C::KIND,
            R::KIND,
            context.len()
        );
        Ok(self.remote.generate(subject_id, &context).await?)
    }
}
