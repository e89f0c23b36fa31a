//! Collaborator ports injected into stores.
//!
//! # Responsibility
//! - Abstract the remote RPC service, the identity provider and the clock.
//! - Keep store logic free of transport, session and wall-clock details.
//!
//! # Invariants
//! - Remote calls are request/response; they are the only suspension points
//!   besides persistence.
//! - Ports are `?Send`: stores run on one cooperative thread.

pub mod clock;
pub mod identity;
pub mod remote;
