//! Collectors for Linux `/proc` and `/sys`.
//!
//! This module provides parsers and the system collector for reading host
//! information from the kernel's virtual filesystems.

pub mod parser;
pub mod system;

pub use system::{
    CpuTopology, DiskUsage, HostInfo, IGNORED_FILESYSTEMS, InterfaceInfo, ProcessInfo,
    SystemCollector, Temperature,
};
