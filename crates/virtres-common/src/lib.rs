//! # virtres-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire virtres workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and holds the VM spec model, the resource [`quantity`]
//! type, and the error enum every other crate returns.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod quantity;
pub mod types;
