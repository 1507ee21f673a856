//! Data layer for the CAPSIM simulation.
//!
//! The engine talks to persistence through the [`Store`] contract; the
//! [`Repository`] batches, retries, and flushes writes on a background
//! task so the simulation loop never blocks on I/O.
//!
//! # Architecture
//!
//! ```text
//! Simulation loop
//!     |
//!     +-- submit() --> Repository (bounded channel)
//!                          |
//!                          +-- flusher task: batch -> retry -> Store
//!                                               |-- PgStore      (production)
//!                                               +-- MemoryStore  (tests, fast runs)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- the `Store` contract and the static-table TTL cache
//! - [`postgres`] -- `PostgreSQL` implementation (UNNEST batch upserts)
//! - [`memory`] -- in-memory implementation with failure injection
//! - [`repository`] -- batched, retrying write-behind buffer
//! - [`error`] -- shared error types

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::{PgStore, PostgresConfig};
pub use repository::{BufferedWrite, Repository, RepositoryConfig};
pub use store::{Store, TableCache};
