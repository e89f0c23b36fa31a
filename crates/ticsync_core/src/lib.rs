//! Offline-first local stores for tic logs and recommendations.
//! Stores own the device copy, queue failed mutations and sync them later.

pub mod db;
pub mod logging;
pub mod model;
pub mod persist;
pub mod ports;
pub mod store;
pub mod sync;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::recommendation::{Recommendation, RecommendationInput, RecommendationPatch};
pub use model::record::{Record, RecordId, UserId, ValidationError};
pub use model::tic_log::{TicLog, TicLogInput, TicLogPatch, TimeOfDay};
pub use persist::snapshot::{Snapshot, SnapshotError};
pub use persist::{InMemoryKeyValueStore, KeyValueStore, PersistenceError, SqliteKeyValueStore};
pub use ports::clock::{Clock, ManualClock, SystemClock};
pub use ports::identity::{IdentityProvider, SessionIdentity};
pub use ports::remote::{GenerateRemote, RemoteClient, RemoteError, RemoteResult};
pub use store::config::StoreConfig;
pub use store::entity_store::{EntityStore, RangeReader};
pub use store::error::{StoreError, StoreResult};
pub use store::mutation::{Mutation, OperationKind, PendingOperation};
pub use store::queue::{DrainOutcome, DrainReport};
pub use sync::coordinator::{GenerationOutcome, SyncCoordinator};
pub use sync::derive::{Deriver, RecentWindowDeriver};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
