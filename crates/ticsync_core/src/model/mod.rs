//! Domain records held by the local stores.
//!
//! # Responsibility
//! - Define the generic `Record` contract every store is written against.
//! - Define the two concrete record kinds: tic logs and recommendations.
//!
//! # Invariants
//! - Every record is identified by exactly one `RecordId`.
//! - Records that exist only optimistically carry a client-local id.

pub mod recommendation;
pub mod record;
pub mod tic_log;
