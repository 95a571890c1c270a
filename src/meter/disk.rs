//! Disk partitions, filesystem usage and block device IO.
//!
//! IO counters in `/proc/diskstats` are cumulative; samples carry per-second
//! rates against the previous read (the first one against the start baseline).

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::collector::procfs::parser::{DiskStats, MountEntry};
use crate::collector::procfs::DiskUsage;
use crate::collector::{CollectError, FileSystem, SystemCollector};
use crate::meter::{per_second, Family, KeyedStats, MeterCore, RecordContext, Sample};
use crate::storage::{RecordSet, StoreError};

pub type DiskMeter<F> = MeterCore<Disk<F>>;

const SECTOR_SIZE: u64 = 512;

const USAGE_SERIES: &[&str] = &[
    "free",
    "used",
    "used_percent",
    "inodes_total",
    "inodes_used",
    "inodes_free",
    "inodes_used_percent",
];

const IO_SERIES: &[&str] = &[
    "read_count",
    "merged_read_count",
    "write_count",
    "merged_write_count",
    "read_bytes",
    "write_bytes",
    "read_time",
    "write_time",
    "iops_in_progress",
    "io_time",
    "weighted_io",
];

/// Per-second IO rates of one block device. `iops_in_progress` is a gauge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceIo {
    pub device: String,
    pub read_count: f64,
    pub merged_read_count: f64,
    pub write_count: f64,
    pub merged_write_count: f64,
    pub read_bytes: f64,
    pub write_bytes: f64,
    pub read_time: f64,
    pub write_time: f64,
    pub iops_in_progress: f64,
    pub io_time: f64,
    pub weighted_io: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionUsage {
    pub mount_point: String,
    pub fs_type: String,
    pub usage: DiskUsage,
}

#[derive(Debug, Clone, Default)]
pub struct DiskSample {
    pub partitions: Vec<MountEntry>,
    pub usages: Vec<PartitionUsage>,
    pub io: Vec<DeviceIo>,
}

type Counters = BTreeMap<String, DiskStats>;

pub struct Disk<F: FileSystem> {
    collector: SystemCollector<F>,
    previous: Option<(Instant, Counters)>,
}

impl<F: FileSystem> Disk<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self {
            collector,
            previous: None,
        }
    }

    fn counters(&self) -> Result<Counters, CollectError> {
        Ok(self
            .collector
            .diskstats()?
            .into_iter()
            .filter(|d| !is_virtual_device(&d.device))
            .map(|d| (d.device.clone(), d))
            .collect())
    }
}

/// Loop and RAM disks carry no useful IO figures.
fn is_virtual_device(name: &str) -> bool {
    name.starts_with("loop") || name.starts_with("ram")
}

/// Rates between two reads of the same device.
pub fn device_io(previous: &DiskStats, current: &DiskStats, elapsed_secs: f64) -> DeviceIo {
    let rate = |p: u64, c: u64| per_second(p, c, elapsed_secs);
    DeviceIo {
        device: current.device.clone(),
        read_count: rate(previous.reads, current.reads),
        merged_read_count: rate(previous.r_merged, current.r_merged),
        write_count: rate(previous.writes, current.writes),
        merged_write_count: rate(previous.w_merged, current.w_merged),
        read_bytes: rate(
            previous.read_sectors.saturating_mul(SECTOR_SIZE),
            current.read_sectors.saturating_mul(SECTOR_SIZE),
        ),
        write_bytes: rate(
            previous.write_sectors.saturating_mul(SECTOR_SIZE),
            current.write_sectors.saturating_mul(SECTOR_SIZE),
        ),
        read_time: rate(previous.read_time, current.read_time),
        write_time: rate(previous.write_time, current.write_time),
        iops_in_progress: current.io_in_progress as f64,
        io_time: rate(previous.io_time, current.io_time),
        weighted_io: rate(previous.io_weighted_time, current.io_weighted_time),
    }
}

impl<F: FileSystem + 'static> Family for Disk<F> {
    const NAME: &'static str = "disk";
    type Sample = DiskSample;

    fn start(&mut self) -> Result<(), CollectError> {
        match self.counters() {
            Ok(counters) => self.previous = Some((Instant::now(), counters)),
            Err(e) => debug!(meter = Self::NAME, error = %e, "no IO baseline"),
        }
        Ok(())
    }

    fn sample(&mut self) -> DiskSample {
        let partitions = self.collector.partitions().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "partitions unavailable");
            Vec::new()
        });

        let usages = partitions
            .iter()
            .map(|p| {
                let usage = self.collector.usage(&p.mount_point).unwrap_or_else(|e| {
                    warn!(meter = Self::NAME, mount_point = %p.mount_point, error = %e, "usage unavailable");
                    DiskUsage::default()
                });
                PartitionUsage {
                    mount_point: p.mount_point.clone(),
                    fs_type: p.fs_type.clone(),
                    usage,
                }
            })
            .collect();

        let now = Instant::now();
        let io = match self.counters() {
            Ok(current) => {
                let io = match &self.previous {
                    Some((at, previous)) => {
                        let elapsed = now.duration_since(*at).as_secs_f64();
                        current
                            .values()
                            .filter_map(|c| {
                                previous.get(&c.device).map(|p| device_io(p, c, elapsed))
                            })
                            .collect()
                    }
                    None => Vec::new(),
                };
                self.previous = Some((now, current));
                io
            }
            Err(e) => {
                warn!(meter = Self::NAME, error = %e, "diskstats unavailable");
                Vec::new()
            }
        };

        DiskSample {
            partitions,
            usages,
            io,
        }
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<DiskSample>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut usage: KeyedStats<String> = KeyedStats::new();
        let mut io: KeyedStats<String> = KeyedStats::new();
        for s in samples {
            for u in &s.data.usages {
                let stats = usage.entry(u.mount_point.clone());
                stats.add("free", u.usage.free as f64);
                stats.add("used", u.usage.used as f64);
                stats.add("used_percent", u.usage.used_percent);
                stats.add("inodes_total", u.usage.inodes_total as f64);
                stats.add("inodes_used", u.usage.inodes_used as f64);
                stats.add("inodes_free", u.usage.inodes_free as f64);
                stats.add("inodes_used_percent", u.usage.inodes_used_percent);
            }
            for d in &s.data.io {
                let stats = io.entry(d.device.clone());
                stats.add("read_count", d.read_count);
                stats.add("merged_read_count", d.merged_read_count);
                stats.add("write_count", d.write_count);
                stats.add("merged_write_count", d.merged_write_count);
                stats.add("read_bytes", d.read_bytes);
                stats.add("write_bytes", d.write_bytes);
                stats.add("read_time", d.read_time);
                stats.add("write_time", d.write_time);
                stats.add("iops_in_progress", d.iops_in_progress);
                stats.add("io_time", d.io_time);
                stats.add("weighted_io", d.weighted_io);
            }
        }

        let latest = samples.last().map(|s| &s.data);

        let mut partitions = RecordSet::new("disk_partitions");
        for p in latest.map(|d| d.partitions.as_slice()).unwrap_or_default() {
            partitions.push(
                ctx.row()
                    .with("device", p.device.as_str())
                    .with("mount_point", p.mount_point.as_str())
                    .with("fs_type", p.fs_type.as_str())
                    .with("options", p.options.as_str()),
            )?;
        }

        let mut usages = RecordSet::new("disk_usages");
        for (path, stats) in usage.iter() {
            let last = latest.and_then(|d| d.usages.iter().find(|u| &u.mount_point == path));
            usages.push(
                ctx.row()
                    .with("path", path.as_str())
                    .with("fstype", last.map(|u| u.fs_type.as_str()).unwrap_or_default())
                    .with("total", last.map(|u| u.usage.total).unwrap_or(0))
                    .stats(stats, USAGE_SERIES),
            )?;
        }

        let mut ios = RecordSet::new("disk_io");
        for (device, stats) in io.iter() {
            ios.push(ctx.row().with("name", device.as_str()).stats(stats, IO_SERIES))?;
        }

        Ok(vec![partitions, usages, ios])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::meter::core::testing::{context, float, table, take_samples};
    use crate::storage::Value;

    fn started(fs: MockFs) -> Disk<MockFs> {
        let mut disk = Disk::new(SystemCollector::new(fs, ProviderPaths::default()));
        disk.start().unwrap();
        disk
    }

    #[test]
    fn test_device_io_rates() {
        let previous = DiskStats {
            device: "sda".to_string(),
            reads: 100,
            read_sectors: 1000,
            io_in_progress: 0,
            ..DiskStats::default()
        };
        let current = DiskStats {
            device: "sda".to_string(),
            reads: 300,
            read_sectors: 3000,
            io_in_progress: 4,
            ..DiskStats::default()
        };
        let io = device_io(&previous, &current, 2.0);
        assert_eq!(io.read_count, 100.0);
        assert_eq!(io.read_bytes, 1000.0 * 512.0);
        assert_eq!(io.iops_in_progress, 4.0);
        assert_eq!(io.write_count, 0.0);
    }

    #[test]
    fn test_device_io_huge_sector_counts_saturate() {
        let previous = DiskStats {
            device: "sdb".to_string(),
            read_sectors: u64::MAX / 256,
            write_sectors: u64::MAX,
            ..DiskStats::default()
        };
        let current = DiskStats {
            read_sectors: u64::MAX / 256 + 10,
            ..previous.clone()
        };
        let io = device_io(&previous, &current, 1.0);
        assert_eq!(io.read_bytes, 0.0);
        assert_eq!(io.write_bytes, 0.0);
    }

    #[test]
    fn test_records() {
        let mut disk = started(MockFs::typical_system());
        let samples = take_samples(&mut disk, 2);
        let sets = disk.records(&context(), &samples).unwrap();

        let partitions = table(&sets, "disk_partitions");
        assert_eq!(partitions.len(), 2);
        assert_eq!(
            partitions.get(0, "mount_point"),
            Some(&Value::Text("/".to_string()))
        );

        let usages = table(&sets, "disk_usages");
        assert_eq!(usages.len(), 2);
        assert_eq!(usages.get(0, "total"), Some(&Value::Int(100 * 1024 * 1024 * 1024)));
        assert_eq!(float(usages, 0, "used_avg"), 40.0 * 1024.0 * 1024.0 * 1024.0);
        assert_eq!(float(usages, 1, "inodes_used_max"), 768_000.0);

        let io = table(&sets, "disk_io");
        assert_eq!(io.len(), 3);
        assert_eq!(io.get(0, "name"), Some(&Value::Text("nvme0n1".to_string())));
        assert_eq!(float(io, 0, "read_count_max"), 0.0);
        assert_eq!(float(io, 0, "iops_in_progress_avg"), 5.0);
    }

    #[test]
    fn test_unknown_mount_usage_degrades_to_zero() {
        let mut fs = MockFs::typical_system();
        fs.add_file(
            "/proc/self/mounts",
            "/dev/sdb1 /backup ext4 rw 0 0\n",
        );
        let mut disk = started(fs);
        let sample = disk.sample();
        assert_eq!(sample.usages.len(), 1);
        assert_eq!(sample.usages[0].usage, DiskUsage::default());
    }

    #[test]
    fn test_bare_system_yields_empty_sets() {
        let mut disk = started(MockFs::bare_system());
        let samples = take_samples(&mut disk, 1);
        let sets = disk.records(&context(), &samples).unwrap();
        assert!(sets.iter().all(|s| s.is_empty()));
    }
}
