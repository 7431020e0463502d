//! Persistence for harvested records
//!
//! - `value`: scalar values and records
//! - `statement`: write statements compiled from a record's field set
//! - `adapter`: the idempotent [`PersistenceAdapter`] and its statement cache
//! - `embedded`: Fjall-backed table store backing the adapter and the task loader
//! - `loader`: [`TaskLoader`] and queue population

pub mod adapter;
pub mod error;
pub mod embedded;
pub mod loader;
mod partitions;
pub mod schema;
pub mod statement;
pub mod value;

pub use adapter::{AdapterFactory, Connection, PersistError, PersistenceAdapter, TableWriter};
pub use error::{Result, StoreError};
pub use embedded::{FjallConnection, FjallStore, FjallWriterFactory};
pub use loader::{Selector, TaskLoader, populate};
pub use schema::{ColumnSpec, ColumnType, TableSchema};
pub use statement::{Statement, StatementKind};
pub use value::{Record, Value, record};
