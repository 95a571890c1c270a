//! Meter framework.
//!
//! A meter samples one metric family on a fixed interval, buffers the raw
//! samples, and once the buffer reaches its threshold reduces them into
//! min/max/avg records that are flushed in one transaction.
//!
//! - [`status`]: the lifecycle state machine
//! - [`accumulator`]: streaming statistics
//! - [`buffer`]: samples since the last flush
//! - `core`: [`MeterCore`], the collect/aggregate/flush pattern shared by all meters
//! - [`registry`]: factories that build meters by name
//!
//! Concrete families: [`cpu`], [`host`], [`disk`], [`memory`], [`network`],
//! [`load`], [`process`].

pub mod accumulator;
pub mod buffer;
pub mod core;
pub mod cpu;
pub mod disk;
pub mod host;
pub mod load;
pub mod memory;
pub mod network;
pub mod process;
pub mod registry;
pub mod status;

pub use accumulator::{KeyedStats, SeriesStats, StatAccumulator};
pub use buffer::{Sample, SampleBuffer};
pub use self::core::{AggregateOutcome, Family, MeterCore, RecordContext, per_second};
pub use registry::{MeterContext, MeterFactory, MeterRegistry};
pub use status::{MeterStatus, StatusCell};

use crate::storage::StoreError;

/// Error type for meter lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    #[error("meter {meter} failed to initialize: {reason}")]
    Initialization { meter: String, reason: String },
    #[error("meter {meter}: illegal transition {from} -> {to}")]
    InvalidTransition {
        meter: String,
        from: MeterStatus,
        to: MeterStatus,
    },
    #[error("unknown meter: {0}")]
    UnknownMeter(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Capability set every meter exposes, whether compiled in or registered at runtime.
///
/// All methods take `&self`; a meter is shared between its scheduler, its bus
/// listener and the orchestrator.
pub trait Meter: Send + Sync {
    fn name(&self) -> &'static str;

    fn status(&self) -> MeterStatus;

    /// Samples currently buffered.
    fn buffered(&self) -> usize;

    /// One-time setup, then `Starting -> Started -> Waiting`.
    fn start(&self) -> Result<(), MeterError>;

    /// Takes one sample if the meter is `Waiting`; returns whether one was appended.
    fn collect(&self) -> bool;

    /// Flushes if the threshold is reached, or unconditionally while stopping.
    fn aggregate(&self) -> AggregateOutcome;

    /// Waits for in-flight work, flushes whatever is buffered and stops.
    fn stop(&self) -> Result<(), MeterError>;
}
