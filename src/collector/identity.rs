//! Host identity resolution.
//!
//! Every aggregated record carries a stable per-host identifier. It is
//! resolved once when the orchestrator starts and shared by all meters.

use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, ProviderPaths, SystemCollector};
use tracing::debug;

/// Supplies the stable identifier of the host being measured.
pub trait HostIdentity: Send + Sync {
    fn host_id(&self) -> Result<String, CollectError>;
}

/// Resolves the host id from `/etc/machine-id`, falling back to the kernel
/// hostname when the machine id is missing or empty.
pub struct MachineIdentity<F: FileSystem> {
    collector: SystemCollector<F>,
}

impl<F: FileSystem> MachineIdentity<F> {
    pub fn new(fs: F, paths: ProviderPaths) -> Self {
        Self {
            collector: SystemCollector::new(fs, paths),
        }
    }
}

impl<F: FileSystem> HostIdentity for MachineIdentity<F> {
    fn host_id(&self) -> Result<String, CollectError> {
        match self.collector.machine_id() {
            Ok(id) if !id.is_empty() => return Ok(id),
            Ok(_) => debug!("machine-id is empty, falling back to hostname"),
            Err(e) => debug!(error = %e, "machine-id unavailable, falling back to hostname"),
        }

        match self.collector.hostname() {
            Ok(name) if !name.is_empty() => Ok(name),
            Ok(_) => Err(CollectError::Unavailable(
                "machine-id and hostname are both empty".to_string(),
            )),
            Err(e) => Err(CollectError::Unavailable(format!(
                "no machine-id and no hostname: {}",
                e
            ))),
        }
    }
}

/// A fixed identifier, for hosts that are named by configuration.
impl HostIdentity for String {
    fn host_id(&self) -> Result<String, CollectError> {
        if self.is_empty() {
            return Err(CollectError::Unavailable("empty host id".to_string()));
        }
        Ok(self.clone())
    }
}
