//! # virtres-runtime
//!
//! Per-VM resource control built on the `virtres-core` primitives.
//!
//! [`controller::ResourceController`] is the entry point the node agent
//! calls: it estimates memory overhead during admission and applies the
//! memlock, realtime, PIT and housekeeping adjustments on each lifecycle
//! transition. Every step is parameterized over a
//! [`backend::HypervisorBackend`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod controller;
pub mod housekeeping;
pub mod isolation;
pub mod memlock;
pub mod overhead;
pub mod pit;
pub mod realtime;

#[cfg(test)]
pub(crate) mod testing;
