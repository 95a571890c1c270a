//! Host description, thermal sensors and logged-in users.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::collector::procfs::parser::UtmpEntry;
use crate::collector::procfs::{HostInfo, Temperature};
use crate::collector::{FileSystem, SystemCollector};
use crate::meter::{Family, KeyedStats, MeterCore, RecordContext, Sample};
use crate::storage::{RecordSet, StoreError};

pub type HostMeter<F> = MeterCore<Host<F>>;

#[derive(Debug, Clone, Default)]
pub struct HostSample {
    pub info: Option<HostInfo>,
    pub temperatures: Vec<Temperature>,
    pub users: Vec<UtmpEntry>,
}

pub struct Host<F: FileSystem> {
    collector: SystemCollector<F>,
}

impl<F: FileSystem> Host<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self { collector }
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl<F: FileSystem + 'static> Family for Host<F> {
    const NAME: &'static str = "host";
    type Sample = HostSample;

    fn sample(&mut self) -> HostSample {
        let info = match self.collector.host_info() {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(meter = Self::NAME, error = %e, "host info unavailable");
                None
            }
        };
        let temperatures = self.collector.temperatures().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "temperatures unavailable");
            Vec::new()
        });
        let users = self.collector.users().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "user sessions unavailable");
            Vec::new()
        });
        HostSample {
            info,
            temperatures,
            users,
        }
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<HostSample>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut host_info = RecordSet::new("host_info");
        if let Some(info) = samples.iter().rev().find_map(|s| s.data.info.as_ref()) {
            host_info.push(
                ctx.row()
                    .with("hostname", info.hostname.as_str())
                    .with("uptime", info.uptime)
                    .with("boot_time", timestamp(info.boot_time))
                    .with("os", info.os.as_str())
                    .with("platform", info.platform.as_str())
                    .with("platform_family", info.platform_family.as_str())
                    .with("platform_version", info.platform_version.as_str())
                    .with("kernel_version", info.kernel_version.as_str())
                    .with("kernel_arch", info.kernel_arch.as_str())
                    .with("virtualization_system", info.virtualization_system.as_str())
                    .with("virtualization_role", info.virtualization_role.as_str()),
            )?;
        }

        let mut sensors: KeyedStats<String> = KeyedStats::new();
        let mut sessions = BTreeSet::new();
        for s in samples {
            for t in &s.data.temperatures {
                sensors.entry(t.sensor_key.clone()).add("temperature", t.celsius);
            }
            for u in &s.data.users {
                sessions.insert((u.user.clone(), u.terminal.clone(), u.host.clone(), u.started));
            }
        }

        let mut temperatures = RecordSet::new("host_temperatures");
        for (key, stats) in sensors.iter() {
            temperatures.push(
                ctx.row()
                    .with("sensor_key", key.as_str())
                    .stat("temperature", &stats.get("temperature")),
            )?;
        }

        let mut users = RecordSet::new("host_users");
        for (user, terminal, host, started) in sessions {
            users.push(
                ctx.row()
                    .with("user", user)
                    .with("terminal", terminal)
                    .with("host", host)
                    .with("started", timestamp(started)),
            )?;
        }

        Ok(vec![host_info, temperatures, users])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::meter::core::testing::{context, float, table, take_samples};
    use crate::storage::Value;

    fn records(fs: MockFs) -> Vec<RecordSet> {
        let mut host = Host::new(SystemCollector::new(fs, ProviderPaths::default()));
        let samples = take_samples(&mut host, 3);
        host.records(&context(), &samples).unwrap()
    }

    #[test]
    fn test_host_info_row() {
        let sets = records(MockFs::typical_system());
        let info = table(&sets, "host_info");
        assert_eq!(info.len(), 1);
        assert_eq!(info.get(0, "hostname"), Some(&Value::Text("web-01".to_string())));
        assert_eq!(info.get(0, "platform"), Some(&Value::Text("debian".to_string())));
        assert_eq!(
            info.get(0, "boot_time"),
            Some(&Value::Timestamp(timestamp(1_700_000_000)))
        );
        assert_eq!(
            info.get(0, "virtualization_role"),
            Some(&Value::Text("guest".to_string()))
        );
    }

    #[test]
    fn test_temperatures_keyed_by_sensor() {
        let sets = records(MockFs::typical_system());
        let temps = table(&sets, "host_temperatures");
        assert_eq!(temps.len(), 3);
        assert_eq!(temps.get(0, "sensor_key"), Some(&Value::Text("acpitz".to_string())));
        assert_eq!(float(temps, 0, "temperature_avg"), 40.0);
        assert_eq!(temps.get(1, "sensor_key"), Some(&Value::Text("acpitz_1".to_string())));
        assert_eq!(float(temps, 2, "temperature_max"), 52.0);
    }

    #[test]
    fn test_users_deduplicated_across_samples() {
        let sets = records(MockFs::typical_system());
        let users = table(&sets, "host_users");
        assert_eq!(users.len(), 1);
        assert_eq!(users.get(0, "user"), Some(&Value::Text("alice".to_string())));
        assert_eq!(users.get(0, "host"), Some(&Value::Text("10.0.0.5".to_string())));
    }

    #[test]
    fn test_bare_system_has_no_rows() {
        let sets = records(MockFs::bare_system());
        assert!(table(&sets, "host_info").is_empty());
        assert!(table(&sets, "host_temperatures").is_empty());
        assert!(table(&sets, "host_users").is_empty());
    }
}
