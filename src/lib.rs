//! hostmeter - host telemetry agent library.
//!
//! Meters sample one family of host metrics (CPU, memory, disks, network,
//! load, host description, named processes) on fixed intervals, reduce each
//! run of samples to min/max/avg records and write them transactionally to a
//! relational store. The `hostmeterd` daemon wires the pieces together.

pub mod bus;
pub mod collector;
pub mod config;
pub mod meter;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;

pub use bus::{Command, Event, EventBus};
pub use config::AgentConfig;
pub use meter::{Meter, MeterError, MeterRegistry, MeterStatus};
pub use orchestrator::{Orchestrator, OrchestratorError};
