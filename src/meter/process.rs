//! Resource usage of named processes, grouped by `comm`.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::warn;

use crate::collector::procfs::ProcessInfo;
use crate::collector::{CollectError, FileSystem, SystemCollector};
use crate::meter::cpu::USER_HZ;
use crate::meter::{Family, KeyedStats, MeterCore, RecordContext, Sample};
use crate::storage::{RecordSet, StoreError};

pub type ProcessMeter<F> = MeterCore<Process<F>>;

const SERIES: &[&str] = &["count", "rss_bytes", "vsize_bytes", "threads", "cpu_percent"];

/// Totals over every process sharing one name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessGroup {
    pub name: String,
    pub count: u64,
    pub rss_bytes: u64,
    pub vsize_bytes: u64,
    pub threads: i64,
    pub cpu_percent: f64,
}

pub struct Process<F: FileSystem> {
    collector: SystemCollector<F>,
    names: Vec<String>,
    previous: Option<(Instant, BTreeMap<u32, u64>)>,
}

impl<F: FileSystem> Process<F> {
    pub fn new(collector: SystemCollector<F>, names: Vec<String>) -> Self {
        Self {
            collector,
            names,
            previous: None,
        }
    }

    fn ticks(processes: &[ProcessInfo]) -> BTreeMap<u32, u64> {
        processes.iter().map(|p| (p.pid, p.cpu_ticks)).collect()
    }
}

/// Groups processes by name. Every name in `names` gets a group, even when
/// nothing matched. CPU is measured against `previous` ticks of the same pid;
/// pids without a previous reading contribute nothing.
pub fn group(
    names: &[String],
    processes: &[ProcessInfo],
    previous: Option<&BTreeMap<u32, u64>>,
    elapsed_secs: f64,
) -> Vec<ProcessGroup> {
    let mut groups: BTreeMap<&str, ProcessGroup> = names
        .iter()
        .map(|n| {
            (
                n.as_str(),
                ProcessGroup {
                    name: n.clone(),
                    ..ProcessGroup::default()
                },
            )
        })
        .collect();

    for p in processes {
        let Some(g) = groups.get_mut(p.name.as_str()) else {
            continue;
        };
        g.count += 1;
        g.rss_bytes += p.rss_bytes;
        g.vsize_bytes += p.vsize_bytes;
        g.threads += p.threads;
        if elapsed_secs > 0.0 {
            if let Some(before) = previous.and_then(|t| t.get(&p.pid)) {
                let ticks = p.cpu_ticks.saturating_sub(*before) as f64;
                g.cpu_percent += 100.0 * ticks / USER_HZ / elapsed_secs;
            }
        }
    }
    groups.into_values().collect()
}

impl<F: FileSystem + 'static> Family for Process<F> {
    const NAME: &'static str = "process";
    type Sample = Vec<ProcessGroup>;

    fn start(&mut self) -> Result<(), CollectError> {
        if self.names.is_empty() {
            warn!(meter = Self::NAME, "no process names configured");
        }
        if let Ok(processes) = self.collector.processes(&self.names) {
            self.previous = Some((Instant::now(), Self::ticks(&processes)));
        }
        Ok(())
    }

    fn sample(&mut self) -> Vec<ProcessGroup> {
        let now = Instant::now();
        let processes = self.collector.processes(&self.names).unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "process table unavailable");
            Vec::new()
        });
        let groups = match &self.previous {
            Some((at, ticks)) => group(
                &self.names,
                &processes,
                Some(ticks),
                now.duration_since(*at).as_secs_f64(),
            ),
            None => group(&self.names, &processes, None, 0.0),
        };
        self.previous = Some((now, Self::ticks(&processes)));
        groups
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<Vec<ProcessGroup>>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut by_name: KeyedStats<String> = KeyedStats::new();
        for s in samples {
            for g in &s.data {
                let stats = by_name.entry(g.name.clone());
                stats.add("count", g.count as f64);
                stats.add("rss_bytes", g.rss_bytes as f64);
                stats.add("vsize_bytes", g.vsize_bytes as f64);
                stats.add("threads", g.threads as f64);
                stats.add("cpu_percent", g.cpu_percent);
            }
        }

        let mut processes = RecordSet::new("processes");
        for (name, stats) in by_name.iter() {
            processes.push(ctx.row().with("name", name.as_str()).stats(stats, SERIES))?;
        }
        Ok(vec![processes])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::meter::core::testing::{context, float, table, take_samples};
    use crate::storage::Value;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn info(name: &str, pid: u32, cpu_ticks: u64) -> ProcessInfo {
        ProcessInfo {
            name: name.to_string(),
            pid,
            rss_bytes: 1024,
            cpu_ticks,
            threads: 2,
            ..ProcessInfo::default()
        }
    }

    #[test]
    fn test_group_cpu_against_previous_ticks() {
        let previous = BTreeMap::from([(10, 100), (11, 50)]);
        let processes = [info("postgres", 10, 300), info("postgres", 11, 50), info("postgres", 12, 999)];
        let groups = group(&names(&["postgres"]), &processes, Some(&previous), 2.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].rss_bytes, 3072);
        assert_eq!(groups[0].threads, 6);
        // 200 ticks over 2s at 100Hz
        assert!((groups[0].cpu_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_keeps_unmatched_names() {
        let groups = group(&names(&["redis", "nginx"]), &[info("sshd", 1, 0)], None, 0.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "nginx");
        assert_eq!(groups[1].count, 0);
    }

    #[test]
    fn test_records() {
        let mut process = Process::new(
            SystemCollector::new(MockFs::typical_system(), ProviderPaths::default()),
            names(&["postgres", "nginx", "redis"]),
        );
        process.start().unwrap();
        let samples = take_samples(&mut process, 2);
        let sets = process.records(&context(), &samples).unwrap();

        let rows = table(&sets, "processes");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.get(0, "name"), Some(&Value::Text("nginx".to_string())));
        assert_eq!(float(rows, 0, "threads_avg"), 4.0);
        assert_eq!(rows.get(1, "name"), Some(&Value::Text("postgres".to_string())));
        assert_eq!(float(rows, 1, "count_max"), 2.0);
        assert_eq!(float(rows, 1, "rss_bytes_min"), (4000 * 4096) as f64);
        assert_eq!(float(rows, 1, "cpu_percent_avg"), 0.0);
        assert_eq!(float(rows, 2, "count_avg"), 0.0);
    }

    #[test]
    fn test_no_names_yields_empty_set() {
        let mut process = Process::new(
            SystemCollector::new(MockFs::typical_system(), ProviderPaths::default()),
            Vec::new(),
        );
        process.start().unwrap();
        let samples = take_samples(&mut process, 1);
        let sets = process.records(&context(), &samples).unwrap();
        assert!(table(&sets, "processes").is_empty());
    }
}
