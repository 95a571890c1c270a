//! Load averages from `/proc/loadavg`.

use tracing::warn;

use crate::collector::procfs::parser::LoadAvg;
use crate::collector::{FileSystem, SystemCollector};
use crate::meter::{Family, MeterCore, RecordContext, Sample, SeriesStats};
use crate::storage::{RecordSet, StoreError};

pub type LoadMeter<F> = MeterCore<Load<F>>;

const SERIES: &[&str] = &["load_1", "load_5", "load_15", "procs_running", "procs_total"];

pub struct Load<F: FileSystem> {
    collector: SystemCollector<F>,
}

impl<F: FileSystem> Load<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self { collector }
    }
}

impl<F: FileSystem + 'static> Family for Load<F> {
    const NAME: &'static str = "load";
    type Sample = LoadAvg;

    fn sample(&mut self) -> LoadAvg {
        self.collector.loadavg().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "load average unavailable");
            LoadAvg::default()
        })
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<LoadAvg>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut stats = SeriesStats::default();
        for s in samples {
            stats.add("load_1", s.data.load1);
            stats.add("load_5", s.data.load5);
            stats.add("load_15", s.data.load15);
            stats.add("procs_running", f64::from(s.data.running));
            stats.add("procs_total", f64::from(s.data.total));
        }

        let mut loads = RecordSet::new("loads");
        loads.push(ctx.row().stats(&stats, SERIES))?;
        Ok(vec![loads])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::meter::core::testing::{context, float, table, take_samples};

    #[test]
    fn test_load_records() {
        let mut load = Load::new(SystemCollector::new(
            MockFs::typical_system(),
            ProviderPaths::default(),
        ));
        let samples = take_samples(&mut load, 2);
        let sets = load.records(&context(), &samples).unwrap();

        let loads = table(&sets, "loads");
        assert_eq!(loads.len(), 1);
        assert_eq!(float(loads, 0, "load_1_avg"), 0.15);
        assert_eq!(float(loads, 0, "load_15_max"), 0.05);
        assert_eq!(float(loads, 0, "procs_total_min"), 150.0);
        assert_eq!(float(loads, 0, "collected_milliseconds"), 3.0);
    }

    #[test]
    fn test_missing_loadavg_degrades_to_zero() {
        let mut load = Load::new(SystemCollector::new(
            MockFs::bare_system(),
            ProviderPaths::default(),
        ));
        let samples = take_samples(&mut load, 1);
        let sets = load.records(&context(), &samples).unwrap();
        assert_eq!(float(table(&sets, "loads"), 0, "load_5_avg"), 0.0);
    }
}
