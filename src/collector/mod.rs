//! OS metric provider for Linux.
//!
//! Every metric family the meters sample is read here, from `/proc`, `/sys`
//! and `/etc`, through the [`FileSystem`] trait so tests can run on
//! [`MockFs`] instead of a live host.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Meters                     │
//! │   cpu  host  disk  memory  network  load     │
//! └───────────────────────┬──────────────────────┘
//!                         │
//!              ┌──────────▼──────────┐   ┌──────────────┐
//!              │   SystemCollector   │   │ HostIdentity │
//!              │  (procfs parsers)   │   │ (machine-id) │
//!              └──────────┬──────────┘   └──────┬───────┘
//!                         └──────────┬──────────┘
//!                             ┌──────▼──────┐
//!                             │  FileSystem │ (trait)
//!                             └──────┬──────┘
//!                      ┌─────────────┴─────────────┐
//!               ┌──────▼──────┐             ┌──────▼──────┐
//!               │   RealFs    │             │   MockFs    │
//!               └─────────────┘             └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use hostmeter::collector::{MockFs, ProviderPaths, SystemCollector};
//!
//! let collector = SystemCollector::new(MockFs::typical_system(), ProviderPaths::default());
//! let load = collector.loadavg().unwrap();
//! assert!(load.load1 > 0.0);
//! ```

pub mod identity;
pub mod mock;
pub mod procfs;
pub mod traits;

use serde::Deserialize;

pub use identity::{HostIdentity, MachineIdentity};
pub use mock::MockFs;
pub use procfs::SystemCollector;
pub use traits::{FileSystem, FsStat, RealFs};

/// Error type for provider queries.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// I/O error reading a source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Source file exists but could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Data is not available on this host.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Root locations of the trees the provider reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderPaths {
    pub proc_path: String,
    pub sys_path: String,
    pub etc_path: String,
    pub run_path: String,
    pub utmp_path: String,
}

impl Default for ProviderPaths {
    fn default() -> Self {
        Self {
            proc_path: "/proc".to_string(),
            sys_path: "/sys".to_string(),
            etc_path: "/etc".to_string(),
            run_path: "/run".to_string(),
            utmp_path: "/var/run/utmp".to_string(),
        }
    }
}
