//! Test support for the persistence engine.
//!
//! [`FakeRemote`] is an in-process RPC backend with per-path tables,
//! call logging, and fault injection; [`fixtures`] maps a small blog
//! domain over it. Integration tests for the engine live in this
//! crate's `tests/` directory.

pub mod fixtures;
pub mod remote;

pub use remote::FakeRemote;
