//! The collect/aggregate/flush pattern shared by every meter.
//!
//! A [`Family`] knows how to take one snapshot of its metric family and how
//! to turn a run of snapshots into record sets. [`MeterCore`] wraps it with the
//! lifecycle, the sample buffer and the transactional flush.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};

use crate::bus::{Event, EventBus};
use crate::collector::CollectError;
use crate::meter::{
    Meter, MeterContext, MeterError, MeterStatus, Sample, SampleBuffer, StatusCell,
};
use crate::storage::{RecordSet, Row, Store, StoreError};

/// One metric family: what to sample and how to reduce samples to records.
pub trait Family: Send + 'static {
    const NAME: &'static str;

    type Sample: Send + 'static;

    /// One-time setup (static topology, counter baselines).
    fn start(&mut self) -> Result<(), CollectError> {
        Ok(())
    }

    /// Takes one snapshot. Provider failures degrade to zero or empty values.
    fn sample(&mut self) -> Self::Sample;

    /// Reduces the buffered samples to record sets, in insert order.
    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<Self::Sample>],
    ) -> Result<Vec<RecordSet>, StoreError>;
}

/// Identity and collection metadata stamped on every row of one flush.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub host_id: &'a str,
    /// When the first sample of the cycle was taken.
    pub collected_at: DateTime<Utc>,
    /// How long the first sample took.
    pub collected_ms: i64,
}

impl RecordContext<'_> {
    /// A row pre-filled with `host_id`, `collected_at` and `collected_milliseconds`.
    pub fn row(&self) -> Row {
        Row::new()
            .with("host_id", self.host_id)
            .with("collected_at", self.collected_at)
            .with("collected_milliseconds", self.collected_ms)
    }
}

/// Per-second rate of a cumulative counter. A counter that went backwards
/// (wrap or reset) yields 0.
pub fn per_second(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs
}

/// Result of one aggregation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// Nothing to do: not claimable, below threshold or empty.
    Skipped,
    Flushed { samples: usize, rows: u64 },
    /// The transaction was rolled back; `pending` samples stay buffered.
    Failed { pending: usize },
}

/// A meter built from a [`Family`].
pub struct MeterCore<F: Family> {
    host_id: String,
    threshold: usize,
    debug: bool,
    status: StatusCell,
    buffer: SampleBuffer<F::Sample>,
    family: Mutex<F>,
    store: Mutex<Box<dyn Store>>,
    bus: EventBus,
}

impl<F: Family> MeterCore<F> {
    pub fn new(ctx: MeterContext, family: F) -> Self {
        Self {
            host_id: ctx.host_id,
            threshold: ctx.config.aggregate_threshold.max(1),
            debug: ctx.debug,
            status: StatusCell::new(F::NAME, ctx.bus.clone()),
            buffer: SampleBuffer::new(),
            family: Mutex::new(family),
            store: Mutex::new(ctx.store),
            bus: ctx.bus,
        }
    }

    fn family(&self) -> MutexGuard<'_, F> {
        self.family.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition that cannot fail while this meter holds the current claim.
    fn advance(&self, next: MeterStatus) {
        if let Err(e) = self.status.transition(next) {
            error!(meter = F::NAME, error = %e, "status transition rejected");
        }
    }

    fn flush(&self) -> AggregateOutcome {
        match self.buffer.drain_with(|samples| self.write(samples)) {
            Ok((0, _)) => AggregateOutcome::Skipped,
            Ok((samples, rows)) => {
                info!(meter = F::NAME, samples, rows, "flushed");
                self.bus.publish(Event::Flushed {
                    meter: F::NAME,
                    samples,
                    rows,
                });
                AggregateOutcome::Flushed { samples, rows }
            }
            Err(e) => {
                let pending = self.buffer.len();
                error!(meter = F::NAME, error = %e, pending, "flush failed, samples retained");
                self.bus.publish(Event::FlushFailed {
                    meter: F::NAME,
                    pending,
                    error: e.to_string(),
                });
                AggregateOutcome::Failed { pending }
            }
        }
    }

    /// Builds the record sets and writes them in one transaction.
    fn write(&self, samples: &[Sample<F::Sample>]) -> Result<u64, StoreError> {
        let Some(first) = samples.first() else {
            return Ok(0);
        };
        let ctx = RecordContext {
            host_id: &self.host_id,
            collected_at: first.collected_at,
            collected_ms: i64::try_from(first.duration.as_millis()).unwrap_or(i64::MAX),
        };
        let sets = self.family().records(&ctx, samples)?;

        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let mut tx = store.begin()?;
        let mut rows = 0;
        for set in sets.iter().filter(|s| !s.is_empty()) {
            match tx.insert(set) {
                Ok(n) => rows += n,
                Err(e) => {
                    if let Err(rb) = tx.rollback() {
                        warn!(meter = F::NAME, error = %rb, "rollback failed");
                    }
                    return Err(e);
                }
            }
        }
        tx.commit()?;
        Ok(rows)
    }
}

impl<F: Family> Meter for MeterCore<F> {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn status(&self) -> MeterStatus {
        self.status.get()
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn start(&self) -> Result<(), MeterError> {
        self.status.transition(MeterStatus::Starting)?;
        if let Err(e) = self.family().start() {
            self.advance(MeterStatus::Stopped);
            return Err(MeterError::Initialization {
                meter: F::NAME.to_string(),
                reason: e.to_string(),
            });
        }
        self.status.transition(MeterStatus::Started)?;
        self.status.transition(MeterStatus::Waiting)?;
        info!(meter = F::NAME, threshold = self.threshold, "meter started");
        Ok(())
    }

    fn collect(&self) -> bool {
        if !self
            .status
            .claim(MeterStatus::Waiting, MeterStatus::Collecting)
        {
            trace!(meter = F::NAME, status = %self.status.get(), "collect skipped");
            return false;
        }

        let started = Instant::now();
        let collected_at = Utc::now();
        let data = self.family().sample();
        let duration = started.elapsed();
        if self.debug {
            debug!(
                meter = F::NAME,
                duration_ms = duration.as_millis() as u64,
                "collect took"
            );
        }

        let len = self.buffer.push(Sample {
            collected_at,
            duration,
            data,
        });
        if len >= self.threshold {
            self.advance(MeterStatus::Aggregating);
            self.flush();
        }
        self.advance(MeterStatus::Waiting);
        true
    }

    fn aggregate(&self) -> AggregateOutcome {
        if self.status.get() == MeterStatus::Stopping {
            return self.flush();
        }
        let buffered = self.buffer.len();
        if buffered < self.threshold {
            trace!(meter = F::NAME, buffered, "below threshold");
            return AggregateOutcome::Skipped;
        }
        if !self
            .status
            .claim(MeterStatus::Waiting, MeterStatus::Aggregating)
        {
            trace!(meter = F::NAME, status = %self.status.get(), "aggregate skipped");
            return AggregateOutcome::Skipped;
        }

        let outcome = self.flush();
        self.advance(MeterStatus::Waiting);
        outcome
    }

    fn stop(&self) -> Result<(), MeterError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let outcome = self.flush();
        self.status.transition(MeterStatus::Stopped)?;
        info!(meter = F::NAME, ?outcome, "meter stopped");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Takes `n` samples straight from a family, bypassing the lifecycle.
    pub fn take_samples<F: Family>(family: &mut F, n: usize) -> Vec<Sample<F::Sample>> {
        (0..n)
            .map(|_| Sample {
                collected_at: Utc::now(),
                duration: std::time::Duration::from_millis(3),
                data: family.sample(),
            })
            .collect()
    }

    pub fn context() -> RecordContext<'static> {
        RecordContext {
            host_id: "host-1",
            collected_at: Utc::now(),
            collected_ms: 3,
        }
    }

    /// Finds a record set by table name.
    pub fn table<'a>(sets: &'a [RecordSet], name: &str) -> &'a RecordSet {
        sets.iter()
            .find(|s| s.table() == name)
            .unwrap_or_else(|| panic!("no record set for {}", name))
    }

    pub fn float(set: &RecordSet, row: usize, column: &str) -> f64 {
        set.get(row, column)
            .and_then(|v| v.as_f64())
            .unwrap_or_else(|| panic!("no numeric {} in row {}", column, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeterConfig;
    use crate::meter::StatAccumulator;
    use crate::storage::{MemoryStore, Value};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// Emits 10, 50, 30, 10, 50, 30, ... into two tables.
    struct Counter {
        values: Vec<f64>,
        next: usize,
        fail_start: bool,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                values: vec![10.0, 50.0, 30.0],
                next: 0,
                fail_start: false,
            }
        }
    }

    impl Family for Counter {
        const NAME: &'static str = "counter";
        type Sample = f64;

        fn start(&mut self) -> Result<(), CollectError> {
            if self.fail_start {
                return Err(CollectError::Unavailable("no counters".to_string()));
            }
            Ok(())
        }

        fn sample(&mut self) -> f64 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }

        fn records(
            &self,
            ctx: &RecordContext<'_>,
            samples: &[Sample<f64>],
        ) -> Result<Vec<RecordSet>, StoreError> {
            let mut acc = StatAccumulator::default();
            samples.iter().for_each(|s| acc.aggregate(s.data));

            let mut values = RecordSet::new("counter_values");
            values.push(ctx.row().stat("value", &acc))?;
            let mut counts = RecordSet::new("counter_counts");
            counts.push(ctx.row().with("samples", samples.len() as i64))?;
            Ok(vec![values, counts])
        }
    }

    fn meter<F: Family>(family: F, store: &MemoryStore, bus: &EventBus) -> MeterCore<F> {
        let ctx = MeterContext {
            host_id: "host-1".to_string(),
            config: MeterConfig {
                aggregate_threshold: 3,
                ..MeterConfig::default()
            },
            debug: true,
            store: Box::new(store.clone()),
            bus: bus.clone(),
        };
        MeterCore::new(ctx, family)
    }

    fn started(store: &MemoryStore) -> MeterCore<Counter> {
        let m = meter(Counter::new(), store, &EventBus::new());
        m.start().unwrap();
        m
    }

    fn value(store: &MemoryStore, row: usize, column: &str) -> Value {
        store.rows("counter_values")[row]
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(100, 300, 2.0), 100.0);
        assert_eq!(per_second(300, 100, 2.0), 0.0);
        assert_eq!(per_second(0, 100, 0.0), 0.0);
    }

    #[test]
    fn test_collect_requires_waiting() {
        let store = MemoryStore::new();
        let m = meter(Counter::new(), &store, &EventBus::new());
        assert!(!m.collect());
        assert_eq!(m.buffered(), 0);

        m.start().unwrap();
        assert_eq!(m.status(), MeterStatus::Waiting);
        assert!(m.collect());
        assert_eq!(m.buffered(), 1);
        assert_eq!(m.status(), MeterStatus::Waiting);
    }

    #[test]
    fn test_threshold_triggers_flush() {
        let store = MemoryStore::new();
        let m = started(&store);

        assert!(m.collect());
        assert!(m.collect());
        assert_eq!(store.commits(), 0);
        assert!(m.collect());

        assert_eq!(m.buffered(), 0);
        assert_eq!(m.status(), MeterStatus::Waiting);
        assert_eq!(store.commits(), 1);
        assert_eq!(store.row_count("counter_values"), 1);
        assert_eq!(value(&store, 0, "value_avg"), Value::Float(30.0));
        assert_eq!(value(&store, 0, "value_min"), Value::Float(10.0));
        assert_eq!(value(&store, 0, "value_max"), Value::Float(50.0));
        assert_eq!(value(&store, 0, "host_id"), Value::Text("host-1".to_string()));
    }

    #[test]
    fn test_aggregate_below_threshold_is_noop() {
        let store = MemoryStore::new();
        let m = started(&store);
        m.collect();
        m.collect();

        assert_eq!(m.aggregate(), AggregateOutcome::Skipped);
        assert_eq!(m.buffered(), 2);
        assert_eq!(m.status(), MeterStatus::Waiting);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_aggregate_below_threshold_keeps_status() {
        let store = MemoryStore::new();
        let bus = EventBus::new();
        let m = meter(Counter::new(), &store, &bus);
        m.start().unwrap();
        m.collect();

        let events = bus.subscribe("meter.counter.status");
        assert_eq!(m.aggregate(), AggregateOutcome::Skipped);
        assert!(events.try_recv().is_err());
        assert_eq!(m.status(), MeterStatus::Waiting);
    }

    fn push(m: &MeterCore<Counter>, values: &[f64]) {
        for v in values {
            m.buffer.push(Sample {
                collected_at: Utc::now(),
                duration: std::time::Duration::from_millis(2),
                data: *v,
            });
        }
    }

    #[test]
    fn test_aggregate_while_stopping_drains_below_threshold() {
        let store = MemoryStore::new();
        let m = started(&store);
        push(&m, &[4.0]);
        assert!(m.status.begin_stop().unwrap());

        assert_eq!(
            m.aggregate(),
            AggregateOutcome::Flushed {
                samples: 1,
                rows: 2
            }
        );
        assert_eq!(m.buffered(), 0);
        assert_eq!(store.commits(), 1);
        assert_eq!(m.status(), MeterStatus::Stopping);
    }

    #[test]
    fn test_aggregate_while_stopping_keeps_samples_on_failure() {
        let store = MemoryStore::new();
        store.fail_begin(true);
        let m = started(&store);
        push(&m, &[4.0, 8.0]);
        assert!(m.status.begin_stop().unwrap());

        assert_eq!(m.aggregate(), AggregateOutcome::Failed { pending: 2 });
        assert_eq!(m.buffered(), 2);
        assert_eq!(store.commits(), 0);

        store.fail_begin(false);
        assert!(matches!(
            m.aggregate(),
            AggregateOutcome::Flushed { samples: 2, .. }
        ));
        assert_eq!(m.buffered(), 0);
    }

    #[test]
    fn test_aggregate_at_threshold_flushes() {
        let store = MemoryStore::new();
        let m = started(&store);
        // Fill without triggering the inline flush.
        for v in [1.0, 2.0, 3.0] {
            m.buffer.push(Sample {
                collected_at: Utc::now(),
                duration: std::time::Duration::from_millis(2),
                data: v,
            });
        }
        assert_eq!(
            m.aggregate(),
            AggregateOutcome::Flushed {
                samples: 3,
                rows: 2
            }
        );
        assert_eq!(value(&store, 0, "collected_milliseconds"), Value::Int(2));
    }

    #[test]
    fn test_stop_flushes_partial_buffer() {
        let store = MemoryStore::new();
        let bus = EventBus::new();
        let events = bus.subscribe("meter.counter.flushed");
        let m = meter(Counter::new(), &store, &bus);
        m.start().unwrap();
        m.collect();
        m.collect();

        m.stop().unwrap();
        assert_eq!(m.status(), MeterStatus::Stopped);
        assert_eq!(m.buffered(), 0);
        assert_eq!(store.commits(), 1);
        assert_eq!(value(&store, 0, "value_avg"), Value::Float(30.0));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::Flushed {
                meter: "counter",
                samples: 2,
                rows: 2
            }
        );

        assert!(!m.collect());
        assert_eq!(m.aggregate(), AggregateOutcome::Skipped);
        m.stop().unwrap();
    }

    #[test]
    fn test_stop_with_empty_buffer_opens_no_transaction() {
        let store = MemoryStore::new();
        store.fail_begin(true);
        let m = started(&store);
        m.stop().unwrap();
        assert_eq!(m.status(), MeterStatus::Stopped);
        assert_eq!(store.commits() + store.rollbacks(), 0);
    }

    #[test]
    fn test_failed_insert_rolls_back_and_retains() {
        let store = MemoryStore::new();
        store.fail_insert_at(2);
        let bus = EventBus::new();
        let failures = bus.subscribe("meter.counter.flush_failed");
        let m = meter(Counter::new(), &store, &bus);
        m.start().unwrap();

        for _ in 0..3 {
            m.collect();
        }
        assert_eq!(store.row_count("counter_values"), 0);
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(m.buffered(), 3);
        assert_eq!(m.status(), MeterStatus::Waiting);
        assert!(matches!(
            failures.try_recv().unwrap(),
            Event::FlushFailed {
                pending: 3,
                ..
            }
        ));

        // The next cycle retries with everything retained.
        assert!(m.collect());
        assert_eq!(m.buffered(), 0);
        assert_eq!(store.commits(), 1);
        let counts = store.rows("counter_counts");
        assert_eq!(counts[0].last().unwrap().1, Value::Int(4));
    }

    #[test]
    fn test_start_failure_returns_to_stopped() {
        let store = MemoryStore::new();
        let mut family = Counter::new();
        family.fail_start = true;
        let m = meter(family, &store, &EventBus::new());

        let err = m.start().unwrap_err();
        assert!(matches!(err, MeterError::Initialization { .. }));
        assert_eq!(m.status(), MeterStatus::Stopped);
        assert!(!m.collect());
    }

    #[test]
    fn test_concurrent_collect_and_aggregate_lose_nothing() {
        let store = MemoryStore::new();
        let m = Arc::new(started(&store));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    let mut appended: i64 = 0;
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            if m.collect() {
                                appended += 1;
                            }
                        } else {
                            m.aggregate();
                        }
                    }
                    appended
                })
            })
            .collect();
        let appended: i64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

        let committed: i64 = store
            .rows("counter_counts")
            .iter()
            .map(|row| match row.last() {
                Some((_, Value::Int(n))) => *n,
                _ => 0,
            })
            .sum();
        assert_eq!(committed + m.buffered() as i64, appended);
        assert_eq!(m.status(), MeterStatus::Waiting);
    }

    /// Records whether sampling and record building ever overlap.
    #[derive(Default)]
    struct Activity {
        sampling: AtomicBool,
        reducing: AtomicBool,
        overlapped: AtomicBool,
    }

    struct Tracked {
        inner: Counter,
        activity: Arc<Activity>,
    }

    impl Family for Tracked {
        const NAME: &'static str = "tracked";
        type Sample = f64;

        fn sample(&mut self) -> f64 {
            let a = &self.activity;
            a.sampling.store(true, Ordering::SeqCst);
            if a.reducing.load(Ordering::SeqCst) {
                a.overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(std::time::Duration::from_micros(200));
            a.sampling.store(false, Ordering::SeqCst);
            self.inner.sample()
        }

        fn records(
            &self,
            ctx: &RecordContext<'_>,
            samples: &[Sample<f64>],
        ) -> Result<Vec<RecordSet>, StoreError> {
            let a = &self.activity;
            a.reducing.store(true, Ordering::SeqCst);
            if a.sampling.load(Ordering::SeqCst) {
                a.overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(std::time::Duration::from_micros(200));
            let sets = self.inner.records(ctx, samples);
            a.reducing.store(false, Ordering::SeqCst);
            sets
        }
    }

    #[test]
    fn test_collect_and_aggregate_never_overlap() {
        let store = MemoryStore::new();
        let activity = Arc::new(Activity::default());
        let family = Tracked {
            inner: Counter::new(),
            activity: Arc::clone(&activity),
        };
        let m = Arc::new(meter(family, &store, &EventBus::new()));
        m.start().unwrap();

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..40 {
                        if i % 2 == 0 {
                            m.collect();
                        } else {
                            m.aggregate();
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert!(store.commits() > 0);
        assert!(!activity.overlapped.load(Ordering::SeqCst));
        m.stop().unwrap();
        assert_eq!(m.buffered(), 0);
    }
}
