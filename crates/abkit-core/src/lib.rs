//! Core types, engine logic and trait definitions for abkit.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! engine functions in [`engine`] run against any [`store::ExperimentTx`]; a
//! backend supplies that unit of work and exposes the async
//! [`store::ExperimentStore`] surface on top of it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod engine;
pub mod error;
pub mod experiment;
pub mod select;
pub mod store;

pub use error::{Error, Result};
