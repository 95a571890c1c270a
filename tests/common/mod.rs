#![allow(dead_code)]

use std::time::{Duration, Instant};

use hostmeter::bus::{Event, Subscription};
use hostmeter::collector::{MockFs, ProviderPaths};
use hostmeter::config::{AgentConfig, MeterConfig};
use hostmeter::storage::MemoryStore;
use hostmeter::{MeterRegistry, Orchestrator};

pub const WAIT: Duration = Duration::from_secs(5);

/// Config with exactly `meters` active, each at `interval_ms` and `threshold`.
pub fn config(meters: &[&str], interval_ms: u64, threshold: usize) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.orchestrator.start_timeout_ms = 2_000;
    config.orchestrator.stop_timeout_ms = 2_000;
    for name in meters {
        config.meters.insert(
            name.to_string(),
            MeterConfig {
                collect_interval_ms: interval_ms,
                aggregate_threshold: threshold,
                ..MeterConfig::default()
            },
        );
    }
    config
}

pub fn orchestrator(config: AgentConfig, fs: MockFs, store: &MemoryStore) -> Orchestrator {
    Orchestrator::new(
        config,
        MeterRegistry::builtin(fs, ProviderPaths::default()),
        Box::new(store.clone()),
        Box::new("host-1".to_string()),
    )
}

/// Next event matching `pred`, skipping others, or `None` after [`WAIT`].
pub fn next_matching<P>(events: &Subscription, mut pred: P) -> Option<Event>
where
    P: FnMut(&Event) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = events.recv_timeout(remaining).ok()?;
        if pred(&event) {
            return Some(event);
        }
    }
}

/// Polls `cond` until it holds or [`WAIT`] passes.
pub fn eventually<C: FnMut() -> bool>(mut cond: C) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
