//! # RemORM RPC
//!
//! The consumed RPC surface of RemORM.
//!
//! This crate provides:
//! - `RpcRequest`/`RpcResponse`, the request/response envelope
//! - `RpcClient`, the minimal `invoke(requests) → responses` contract
//! - `Verb` and `EntityMethods`, per-entity remote method resolution
//! - `CrudApi`, the five persistence verbs plus `count` over wire values
//! - `ClientRegistry` and `ApiRegistry`, resolution of declared client
//!   names and API aliases to live implementations
//! - `MockRpcClient`, a scripted client for tests
//!
//! The engine never opens sockets itself; everything network-shaped lives
//! behind `RpcClient`. A client may batch the requests handed to a single
//! `invoke` call, but must return one response per request, in order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod client;
mod error;
mod method;
mod registry;

pub use api::{CrudApi, RpcCrudApi, SearchQuery, SortOrder};
pub use client::{MockRpcClient, RpcClient, RpcFault, RpcRequest, RpcResponse};
pub use error::{RpcError, RpcResult};
pub use method::{EntityMethods, Verb};
pub use registry::{ApiFactory, ApiRegistry, ClientRegistry};
