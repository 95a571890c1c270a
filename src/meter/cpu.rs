//! CPU utilization, times and topology.
//!
//! Topology and a `/proc/stat` baseline are read once at start. Each sample
//! then derives busy percent from the jiffy delta against the previous read,
//! per core and for the aggregate line (core index `-1`).

use tracing::warn;

use crate::collector::procfs::parser::{CpuStat, GlobalStat};
use crate::collector::procfs::CpuTopology;
use crate::collector::{CollectError, FileSystem, SystemCollector};
use crate::meter::{Family, KeyedStats, MeterCore, RecordContext, Sample, SeriesStats};
use crate::storage::{RecordSet, StoreError};

pub type CpuMeter<F> = MeterCore<Cpu<F>>;

/// Kernel clock ticks per second for `/proc/stat`.
pub(crate) const USER_HZ: f64 = 100.0;

/// Core index of the aggregate `cpu` line.
pub const AGGREGATE_CORE: i32 = -1;

const TIME_SERIES: &[&str] = &[
    "percent",
    "times_total",
    "times_user",
    "times_system",
    "times_idle",
    "times_nice",
    "times_io_wait",
    "times_irq",
    "times_softirq",
    "times_steal",
    "times_guest",
    "times_guest_nice",
];

const SCHED_SERIES: &[&str] = &[
    "percent",
    "procs_running",
    "procs_blocked",
    "procs_created",
    "ctxt",
];

/// One core's utilization and cumulative times (seconds).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreTimes {
    pub index: i32,
    pub percent: f64,
    pub total: f64,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub nice: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSample {
    pub cores: Vec<CoreTimes>,
    pub procs_running: u32,
    pub procs_blocked: u32,
    /// Forks since the previous sample.
    pub procs_created: u64,
    /// Context switches since the previous sample.
    pub ctxt: u64,
}

pub struct Cpu<F: FileSystem> {
    collector: SystemCollector<F>,
    topology: CpuTopology,
    previous: Option<GlobalStat>,
}

impl<F: FileSystem> Cpu<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self {
            collector,
            topology: CpuTopology::default(),
            previous: None,
        }
    }
}

/// Busy share of the ticks elapsed between two reads of the same core.
pub fn busy_percent(previous: &CpuStat, current: &CpuStat) -> f64 {
    let total = current.total().saturating_sub(previous.total());
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle_total().saturating_sub(previous.idle_total());
    100.0 * total.saturating_sub(idle) as f64 / total as f64
}

fn core_index(stat: &CpuStat) -> i32 {
    stat.cpu_id
        .and_then(|id| i32::try_from(id).ok())
        .unwrap_or(AGGREGATE_CORE)
}

fn core_times(stat: &CpuStat, previous: Option<&GlobalStat>) -> CoreTimes {
    let secs = |ticks: u64| ticks as f64 / USER_HZ;
    let percent = previous
        .and_then(|p| p.cpus.iter().find(|c| c.cpu_id == stat.cpu_id))
        .map(|p| busy_percent(p, stat))
        .unwrap_or(0.0);
    CoreTimes {
        index: core_index(stat),
        percent,
        total: secs(stat.total()),
        user: secs(stat.user),
        system: secs(stat.system),
        idle: secs(stat.idle),
        nice: secs(stat.nice),
        iowait: secs(stat.iowait),
        irq: secs(stat.irq),
        softirq: secs(stat.softirq),
        steal: secs(stat.steal),
        guest: secs(stat.guest),
        guest_nice: secs(stat.guest_nice),
    }
}

fn core_label(index: i32) -> String {
    if index == AGGREGATE_CORE {
        "cpu-total".to_string()
    } else {
        format!("cpu{}", index)
    }
}

impl<F: FileSystem + 'static> Family for Cpu<F> {
    const NAME: &'static str = "cpu";
    type Sample = CpuSample;

    fn start(&mut self) -> Result<(), CollectError> {
        self.topology = self.collector.cpu_topology()?;
        self.previous = Some(self.collector.cpu_times()?);
        Ok(())
    }

    fn sample(&mut self) -> CpuSample {
        let current = match self.collector.cpu_times() {
            Ok(stat) => stat,
            Err(e) => {
                warn!(meter = Self::NAME, error = %e, "cpu times unavailable");
                let logical = i32::try_from(self.topology.logical).unwrap_or(0);
                let cores = std::iter::once(AGGREGATE_CORE)
                    .chain(0..logical)
                    .map(|index| CoreTimes {
                        index,
                        ..CoreTimes::default()
                    })
                    .collect();
                return CpuSample {
                    cores,
                    ..CpuSample::default()
                };
            }
        };

        let previous = self.previous.as_ref();
        let sample = CpuSample {
            cores: current
                .cpus
                .iter()
                .map(|c| core_times(c, previous))
                .collect(),
            procs_running: current.procs_running,
            procs_blocked: current.procs_blocked,
            procs_created: previous
                .map(|p| current.processes.saturating_sub(p.processes))
                .unwrap_or(0),
            ctxt: previous
                .map(|p| current.ctxt.saturating_sub(p.ctxt))
                .unwrap_or(0),
        };
        self.previous = Some(current);
        sample
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<CpuSample>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut per_core: KeyedStats<i32> = KeyedStats::new();
        let mut sched = SeriesStats::default();
        for s in samples {
            for c in &s.data.cores {
                let stats = per_core.entry(c.index);
                stats.add("percent", c.percent);
                stats.add("times_total", c.total);
                stats.add("times_user", c.user);
                stats.add("times_system", c.system);
                stats.add("times_idle", c.idle);
                stats.add("times_nice", c.nice);
                stats.add("times_io_wait", c.iowait);
                stats.add("times_irq", c.irq);
                stats.add("times_softirq", c.softirq);
                stats.add("times_steal", c.steal);
                stats.add("times_guest", c.guest);
                stats.add("times_guest_nice", c.guest_nice);
                if c.index == AGGREGATE_CORE {
                    sched.add("percent", c.percent);
                }
            }
            sched.add("procs_running", f64::from(s.data.procs_running));
            sched.add("procs_blocked", f64::from(s.data.procs_blocked));
            sched.add("procs_created", s.data.procs_created as f64);
            sched.add("ctxt", s.data.ctxt as f64);
        }

        let mut infos = RecordSet::new("cpu_core_infos");
        for core in &self.topology.cores {
            infos.push(
                ctx.row()
                    .with("cpu", core.processor)
                    .with("vendor_id", core.vendor_id.as_str())
                    .with("family", core.family.as_str())
                    .with("model", core.model.as_str())
                    .with("stepping", core.stepping)
                    .with("physical_id", core.physical_id.as_str())
                    .with("core_id", core.core_id.as_str())
                    .with("cores", core.cores)
                    .with("model_name", core.model_name.as_str())
                    .with("mhz", core.mhz)
                    .with("cache_size", core.cache_size)
                    .with("flags", core.flags.join(","))
                    .with("microcode", core.microcode.as_str()),
            )?;
        }

        let mut times = RecordSet::new("cpu_times");
        for (index, stats) in per_core.iter() {
            times.push(
                ctx.row()
                    .with("cpu", core_label(*index))
                    .with("core_index", *index)
                    .stats(stats, TIME_SERIES),
            )?;
        }

        let mut cpus = RecordSet::new("cpus");
        cpus.push(
            ctx.row()
                .with("physical_cores", self.topology.physical)
                .with("logical_cores", self.topology.logical)
                .stats(&sched, SCHED_SERIES),
        )?;

        Ok(vec![infos, times, cpus])
    }
}
