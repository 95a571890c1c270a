//! Virtual memory, swap totals and swap devices.

use tracing::warn;

use crate::collector::procfs::parser::{MemInfo, SwapDevice};
use crate::collector::{FileSystem, SystemCollector};
use crate::meter::{Family, KeyedStats, MeterCore, RecordContext, Sample, SeriesStats};
use crate::storage::{RecordSet, StoreError};

pub type MemoryMeter<F> = MeterCore<Memory<F>>;

const KIB: u64 = 1024;

const MEMORY_SERIES: &[&str] = &[
    "available",
    "used",
    "used_percent",
    "free",
    "buffers",
    "cached",
    "active",
    "inactive",
    "shared",
    "slab",
    "dirty",
    "committed",
];

const SWAP_SERIES: &[&str] = &["used", "free", "used_percent", "cached"];

const DEVICE_SERIES: &[&str] = &["used", "used_percent"];

#[derive(Debug, Clone, Default)]
pub struct MemorySample {
    pub memory: MemInfo,
    pub swap_devices: Vec<SwapDevice>,
}

pub struct Memory<F: FileSystem> {
    collector: SystemCollector<F>,
}

impl<F: FileSystem> Memory<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self { collector }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

impl<F: FileSystem + 'static> Family for Memory<F> {
    const NAME: &'static str = "memory";
    type Sample = MemorySample;

    fn sample(&mut self) -> MemorySample {
        let memory = self.collector.meminfo().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "meminfo unavailable");
            MemInfo::default()
        });
        let swap_devices = self.collector.swap_devices().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "swap devices unavailable");
            Vec::new()
        });
        MemorySample {
            memory,
            swap_devices,
        }
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<MemorySample>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut mem = SeriesStats::default();
        let mut swap = SeriesStats::default();
        let mut devices: KeyedStats<String> = KeyedStats::new();

        for s in samples {
            let m = &s.data.memory;
            let used = m.mem_total.saturating_sub(m.mem_available);
            mem.add("available", (m.mem_available * KIB) as f64);
            mem.add("used", (used * KIB) as f64);
            mem.add("used_percent", percent(used, m.mem_total));
            mem.add("free", (m.mem_free * KIB) as f64);
            mem.add("buffers", (m.buffers * KIB) as f64);
            mem.add("cached", (m.cached * KIB) as f64);
            mem.add("active", (m.active * KIB) as f64);
            mem.add("inactive", (m.inactive * KIB) as f64);
            mem.add("shared", (m.shmem * KIB) as f64);
            mem.add("slab", (m.slab * KIB) as f64);
            mem.add("dirty", (m.dirty * KIB) as f64);
            mem.add("committed", (m.committed_as * KIB) as f64);

            let swap_used = m.swap_total.saturating_sub(m.swap_free);
            swap.add("used", (swap_used * KIB) as f64);
            swap.add("free", (m.swap_free * KIB) as f64);
            swap.add("used_percent", percent(swap_used, m.swap_total));
            swap.add("cached", (m.swap_cached * KIB) as f64);

            for d in &s.data.swap_devices {
                let stats = devices.entry(d.name.clone());
                stats.add("used", (d.used * KIB) as f64);
                stats.add("used_percent", percent(d.used, d.size));
            }
        }

        // Totals and device attributes come from the latest sample.
        let latest = samples.last().map(|s| &s.data);
        let total = latest.map(|d| d.memory.mem_total).unwrap_or(0);
        let swap_total = latest.map(|d| d.memory.swap_total).unwrap_or(0);

        let mut memory = RecordSet::new("memory");
        memory.push(
            ctx.row()
                .with("total", total * KIB)
                .stats(&mem, MEMORY_SERIES),
        )?;

        let mut swap_memory = RecordSet::new("swap_memory");
        swap_memory.push(
            ctx.row()
                .with("total", swap_total * KIB)
                .stats(&swap, SWAP_SERIES),
        )?;

        let mut swap_devices = RecordSet::new("swap_devices");
        for (name, stats) in devices.iter() {
            let device = latest.and_then(|d| d.swap_devices.iter().find(|s| &s.name == name));
            swap_devices.push(
                ctx.row()
                    .with("name", name.as_str())
                    .with("kind", device.map(|d| d.kind.as_str()).unwrap_or_default())
                    .with("size", device.map(|d| d.size * KIB).unwrap_or(0))
                    .with("priority", device.map(|d| d.priority).unwrap_or(0))
                    .stats(stats, DEVICE_SERIES),
            )?;
        }

        Ok(vec![memory, swap_memory, swap_devices])
    }
}
