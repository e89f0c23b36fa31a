//! Remote source-of-truth contracts.

use crate::model::record::{Record, RecordId};
use crate::store::mutation::Mutation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure reported by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The service answered with a non-success response.
    Rejected { status: u16, message: String },
    /// Transport-level failure; the service was never reached or never answered.
    Unreachable(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { status, message } => {
                write!(f, "remote rejected request ({status}): {message}")
            }
            Self::Unreachable(message) => write!(f, "remote unreachable: {message}"),
        }
    }
}

impl Error for RemoteError {}

/// Request/response RPC surface for one record kind.
#[async_trait(?Send)]
pub trait RemoteClient<R: Record> {
    /// Submits an optimistic draft; returns the record under its server id.
    async fn submit_create(&self, draft: &R) -> RemoteResult<R>;
    async fn submit_update(&self, id: &RecordId, patch: &R::Patch) -> RemoteResult<R>;
    async fn submit_delete(&self, id: &RecordId) -> RemoteResult<()>;
    async fn read_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RemoteResult<Vec<R>>;
    /// Applies several mutations in one request; returns every record touched.
    async fn submit_batch(&self, mutations: &[Mutation<R>]) -> RemoteResult<Vec<R>>;
}

/// Remote derived-record generation (e.g. recommendations from tic logs).
#[async_trait(?Send)]
pub trait GenerateRemote<C: Record, R: Record> {
    async fn generate(&self, subject_id: &str, context: &[C]) -> RemoteResult<Vec<R>>;
}
