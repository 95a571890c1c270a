//! Persistence of aggregated records.
//!
//! - [`model`]: values, rows and homogeneous record sets
//! - [`store`]: the `Store` / `Transaction` / `Connector` seams
//! - [`postgres`]: PostgreSQL implementation used by the daemon
//! - [`memory`]: in-memory implementation for dry runs and tests

pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use model::{RecordSet, Row, Value};
pub use postgres::{PgConnector, PgStore};
pub use store::{Connector, Store, StoreError, Transaction};
