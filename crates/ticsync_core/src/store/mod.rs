//! Local entity stores with an optimistic-then-confirm mutation protocol.
//!
//! # Responsibility
//! - Own the device-local copy of one record kind.
//! - Memoize range reads, queue failed mutations for retry.
//! - Route every state change through a pure reducer.
//!
//! # Invariants
//! - No `RefCell` borrow is held across an `.await`.
//! - An optimistic id is swapped for the server id in one reducer step.
//! - At most one queue drain per store is in flight.

pub mod config;
pub mod entity_store;
pub mod error;
pub mod mutation;
pub mod queue;
pub mod range_cache;
pub mod state;
