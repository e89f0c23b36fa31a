//! Cross-store synchronization.
//!
//! # Responsibility
//! - Drain queued mutations through the owning store's mutation path.
//! - Rate-limit derived generation per subject.
//! - Restore and persist durable snapshots.
//!
//! # Invariants
//! - One drain per store at a time; spurious calls are no-ops.
//! - Persistence failures are logged and swallowed.

pub mod coordinator;
pub mod derive;
