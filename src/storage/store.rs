//! Persistence collaborator traits.
//!
//! A meter owns one [`Store`] for its lifetime. Each aggregation cycle opens
//! one [`Transaction`], inserts every record set, then commits or rolls back.
//! Transactions are never shared between meters.

use crate::storage::RecordSet;

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("begin failed: {0}")]
    Begin(String),
    #[error("insert into {table} failed: {message}")]
    Insert { table: String, message: String },
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("rollback failed: {0}")]
    Rollback(String),
    #[error("invalid record set for {table}: {message}")]
    Schema { table: String, message: String },
}

/// An open transaction.
pub trait Transaction {
    /// Bulk-inserts one homogeneous record set. Returns the number of rows written.
    fn insert(&mut self, records: &RecordSet) -> Result<u64, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A transactional sink for record sets.
pub trait Store: Send {
    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}

/// Opens stores, one per meter.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Store>, StoreError>;

    /// Short description for logs (never includes credentials).
    fn describe(&self) -> String;
}
