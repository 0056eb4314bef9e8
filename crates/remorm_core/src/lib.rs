//! Unit-of-work persistence over remote RPC APIs.
//!
//! The engine manages plain Rust structs against a remote CRUD service:
//! metadata describes how each class maps to wire records, an identity
//! map guarantees at most one in-memory entity per remote record, lazy
//! references and collections defer remote reads, and one ordered flush
//! writes accumulated changes back as creates, patches, and deletes.
//!
//! Entry point is [`EntityManager`]; see [`EntityManagerBuilder`] for
//! assembly.

mod cache;
mod collection;
mod entity;
mod error;
mod flatten;
mod hydrate;
mod identity;
mod manager;
mod persister;
mod proxy;
mod uow;

pub use cache::{CacheBackend, InMemoryCache, KeyStrategy};
pub use collection::LazyCollection;
pub use entity::{AccessorTable, AccessorTableBuilder, AssocValue, Entity, EntityRegistry};
pub use error::{CoreError, CoreResult};
pub use flatten::{flatten, hash_of, single_id, IdInput, IdMap};
pub use identity::IdentityMap;
pub use manager::{EntityManager, EntityManagerBuilder, Repository};
pub use persister::EntityPersister;
pub use proxy::{EntityRef, Ref};
pub use uow::{EntityState, UnitOfWork};
