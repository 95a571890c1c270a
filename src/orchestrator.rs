//! Owns the meter set and drives its collective lifecycle over the bus.
//!
//! Each meter gets a listener thread subscribed to [`COMMANDS`]. `Start`
//! starts the meter and its own [`Scheduler`], `Collect` asks it for one
//! sample and `Stop` stops the scheduler, flushes and ends the listener.
//! The orchestrator only publishes commands and waits for the status events
//! they cause; it never calls a meter's lifecycle methods itself.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::bus::{COMMANDS, Command, Event, EventBus, Subscription};
use crate::collector::{CollectError, HostIdentity};
use crate::config::AgentConfig;
use crate::meter::{Meter, MeterContext, MeterError, MeterRegistry, MeterStatus};
use crate::scheduler::Scheduler;
use crate::storage::Connector;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("cannot resolve host identity: {0}")]
    Identity(CollectError),
    #[error(transparent)]
    Meter(#[from] MeterError),
    #[error("meters not ready in time: {pending:?}")]
    StartTimeout { pending: Vec<&'static str> },
    #[error("meters not stopped in time: {pending:?}")]
    StopTimeout { pending: Vec<&'static str> },
    #[error("orchestrator is already running")]
    AlreadyRunning,
    #[error("orchestrator is not running")]
    NotRunning,
    #[error("cannot spawn thread: {0}")]
    Spawn(#[from] io::Error),
}

pub struct Orchestrator {
    config: AgentConfig,
    registry: MeterRegistry,
    connector: Box<dyn Connector>,
    identity: Box<dyn HostIdentity>,
    bus: EventBus,
    host_id: Option<String>,
    meters: Vec<Arc<dyn Meter>>,
    listeners: Vec<JoinHandle<()>>,
    ticker: Option<Scheduler>,
}

impl Orchestrator {
    pub fn new(
        config: AgentConfig,
        registry: MeterRegistry,
        connector: Box<dyn Connector>,
        identity: Box<dyn HostIdentity>,
    ) -> Self {
        Self {
            config,
            registry,
            connector,
            identity,
            bus: EventBus::new(),
            host_id: None,
            meters: Vec::new(),
            listeners: Vec::new(),
            ticker: None,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn meters(&self) -> &[Arc<dyn Meter>] {
        &self.meters
    }

    pub fn statuses(&self) -> Vec<(&'static str, MeterStatus)> {
        self.meters.iter().map(|m| (m.name(), m.status())).collect()
    }

    /// Resolved on the first successful [`Orchestrator::start`].
    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        !self.meters.is_empty()
    }

    /// Builds the active meters, starts them and waits until every one is
    /// `Waiting`. If any meter fails to start or the start timeout passes,
    /// the meters already running are stopped again and the error returned.
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        if self.is_running() {
            return Err(OrchestratorError::AlreadyRunning);
        }

        let host_id = self
            .identity
            .host_id()
            .map_err(OrchestratorError::Identity)?;
        info!(host_id = %host_id, store = %self.connector.describe(), "starting meters");

        let mut meters = Vec::new();
        for (name, config) in self.config.active_meters() {
            let store = self.connector.connect().map_err(MeterError::from)?;
            let ctx = MeterContext {
                host_id: host_id.clone(),
                config: config.clone(),
                debug: self.config.settings.debug,
                store,
                bus: self.bus.clone(),
            };
            meters.push((self.registry.create(name, ctx)?, config.collect_interval()));
        }
        self.host_id = Some(host_id);

        // Subscribe before anything is published so no status change is missed.
        let events = self.bus.subscribe("meter.");
        for (meter, interval) in meters {
            let commands = self.bus.subscribe(COMMANDS);
            let listener = {
                let meter = meter.clone();
                let bus = self.bus.clone();
                thread::Builder::new()
                    .name(format!("meter-{}", meter.name()))
                    .spawn(move || listen(meter, commands, bus, interval))
            };
            match listener {
                Ok(handle) => self.listeners.push(handle),
                Err(e) => {
                    self.meters.push(meter);
                    self.abort_start();
                    return Err(e.into());
                }
            }
            self.meters.push(meter);
        }

        self.bus.publish(Event::Command(Command::Start));
        if let Err(e) = self.await_ready(&events) {
            events.close();
            self.abort_start();
            return Err(e);
        }

        if let Some(period) = self.config.orchestrator.collect_tick() {
            let bus = self.bus.clone();
            let ticker = Scheduler::start("collect", period, move || {
                bus.publish(Event::Command(Command::Collect));
            });
            match ticker {
                Ok(ticker) => self.ticker = Some(ticker),
                Err(e) => {
                    self.abort_start();
                    return Err(e.into());
                }
            }
        }

        info!(meters = self.meters.len(), "all meters waiting");
        Ok(())
    }

    /// Stops every meter (each flushes what it has buffered) and releases them.
    pub fn stop(&mut self) -> Result<(), OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }
        info!("stopping meters");
        self.shutdown()
    }

    fn await_ready(&self, events: &Subscription) -> Result<(), OrchestratorError> {
        let mut pending: BTreeSet<&'static str> = self
            .meters
            .iter()
            .filter(|m| m.status() != MeterStatus::Waiting)
            .map(|m| m.name())
            .collect();
        let deadline = Instant::now() + self.config.orchestrator.start_timeout();

        while !pending.is_empty() {
            match recv_until(events, deadline) {
                Some(Event::StatusChanged {
                    meter,
                    status: MeterStatus::Waiting,
                }) => {
                    pending.remove(meter);
                }
                Some(Event::StartFailed { meter, reason }) => {
                    return Err(MeterError::Initialization {
                        meter: meter.to_string(),
                        reason,
                    }
                    .into());
                }
                Some(_) => {}
                None => {
                    return Err(OrchestratorError::StartTimeout {
                        pending: pending.into_iter().collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn abort_start(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "meters left running after failed start");
        }
    }

    fn shutdown(&mut self) -> Result<(), OrchestratorError> {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }

        let events = self.bus.subscribe("meter.");
        let mut pending: BTreeSet<&'static str> = self
            .meters
            .iter()
            .filter(|m| m.status() != MeterStatus::Stopped)
            .map(|m| m.name())
            .collect();
        self.bus.publish(Event::Command(Command::Stop));

        let deadline = Instant::now() + self.config.orchestrator.stop_timeout();
        while !pending.is_empty() {
            match recv_until(&events, deadline) {
                Some(Event::StatusChanged {
                    meter,
                    status: MeterStatus::Stopped,
                }) => {
                    pending.remove(meter);
                }
                Some(_) => {}
                None => break,
            }
        }

        self.meters.clear();
        if !pending.is_empty() {
            // Blocked listeners are detached rather than joined.
            self.listeners.clear();
            return Err(OrchestratorError::StopTimeout {
                pending: pending.into_iter().collect(),
            });
        }

        for handle in self.listeners.drain(..) {
            if handle.join().is_err() {
                error!("meter listener panicked");
            }
        }
        info!("all meters stopped");
        Ok(())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "shutdown on drop incomplete");
            }
        }
    }
}

/// Next event, or `None` once `deadline` has passed.
fn recv_until(events: &Subscription, deadline: Instant) -> Option<Event> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match events.recv_timeout(remaining) {
        Ok(event) => Some(event),
        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
    }
}

/// Command loop of one meter, run on its own thread until `Stop`.
fn listen(meter: Arc<dyn Meter>, commands: Subscription, bus: EventBus, interval: Duration) {
    let name = meter.name();
    let mut scheduler: Option<Scheduler> = None;

    for event in commands.iter() {
        let Event::Command(command) = event else {
            continue;
        };
        match command {
            Command::Start => {
                if let Err(e) = meter.start() {
                    error!(meter = name, error = %e, "start failed");
                    let reason = match e {
                        MeterError::Initialization { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    bus.publish(Event::StartFailed { meter: name, reason });
                    continue;
                }
                let m = meter.clone();
                match Scheduler::start(name, interval, move || {
                    m.collect();
                }) {
                    Ok(s) => scheduler = Some(s),
                    Err(e) => error!(meter = name, error = %e, "cannot start scheduler"),
                }
            }
            Command::Collect => {
                meter.collect();
            }
            Command::Stop => {
                if let Some(mut s) = scheduler.take() {
                    s.stop();
                }
                if let Err(e) = meter.stop() {
                    error!(meter = name, error = %e, "stop failed");
                }
                break;
            }
        }
    }
    debug!(meter = name, "listener finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::config::MeterConfig;
    use crate::meter::registry::FnFactory;
    use crate::storage::MemoryStore;

    fn config(meters: &[&str], interval_ms: u64, threshold: usize) -> AgentConfig {
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

    fn orchestrator(config: AgentConfig, store: &MemoryStore, host: &str) -> Orchestrator {
        Orchestrator::new(
            config,
            MeterRegistry::builtin(MockFs::typical_system(), ProviderPaths::default()),
            Box::new(store.clone()),
            Box::new(host.to_string()),
        )
    }

    #[test]
    fn test_start_and_stop() {
        let store = MemoryStore::new();
        let mut orch = orchestrator(config(&["load", "memory"], 20, 1000), &store, "host-1");
        orch.start().unwrap();

        assert!(orch.is_running());
        assert_eq!(orch.host_id(), Some("host-1"));
        assert_eq!(
            orch.statuses(),
            [("load", MeterStatus::Waiting), ("memory", MeterStatus::Waiting)]
        );
        assert!(matches!(orch.start(), Err(OrchestratorError::AlreadyRunning)));

        thread::sleep(Duration::from_millis(100));
        let meters: Vec<Arc<dyn Meter>> = orch.meters().to_vec();
        orch.stop().unwrap();

        assert!(!orch.is_running());
        for meter in &meters {
            assert_eq!(meter.status(), MeterStatus::Stopped);
            assert_eq!(meter.buffered(), 0);
        }
        // Below threshold, so each meter flushed exactly once: on stop.
        assert_eq!(store.commits(), 2);
        assert!(matches!(orch.stop(), Err(OrchestratorError::NotRunning)));
    }

    #[test]
    fn test_identity_failure_creates_no_meters() {
        let store = MemoryStore::new();
        let mut orch = orchestrator(config(&["load"], 20, 10), &store, "");
        let err = orch.start().unwrap_err();
        assert!(matches!(err, OrchestratorError::Identity(_)));
        assert!(orch.meters().is_empty());
        assert_eq!(orch.host_id(), None);
    }

    #[test]
    fn test_unknown_meter_aborts_start() {
        let store = MemoryStore::new();
        let mut orch = orchestrator(config(&["gpu"], 20, 10), &store, "host-1");
        let err = orch.start().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Meter(MeterError::UnknownMeter(ref name)) if name == "gpu"
        ));
        assert!(!orch.is_running());
    }

    #[test]
    fn test_failed_meter_start_stops_the_others() {
        let mut registry = MeterRegistry::builtin(MockFs::bare_system(), ProviderPaths::default());
        registry.register(Box::new(FnFactory::new("broken", |_| {
            Err(MeterError::Initialization {
                meter: "broken".to_string(),
                reason: "no device".to_string(),
            })
        })));
        let store = MemoryStore::new();

        // cpu cannot read /proc/cpuinfo on a bare system, so its start fails.
        let mut orch = Orchestrator::new(
            config(&["cpu", "load"], 20, 10),
            MeterRegistry::builtin(MockFs::bare_system(), ProviderPaths::default()),
            Box::new(store.clone()),
            Box::new("host-1".to_string()),
        );
        let err = orch.start().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Meter(MeterError::Initialization { ref meter, .. }) if meter == "cpu"
        ));
        assert!(!orch.is_running());

        let mut orch = Orchestrator::new(
            config(&["broken", "load"], 20, 10),
            registry,
            Box::new(store),
            Box::new("host-1".to_string()),
        );
        assert!(matches!(
            orch.start(),
            Err(OrchestratorError::Meter(MeterError::Initialization { .. }))
        ));
    }

    #[test]
    fn test_global_tick_drives_collection() {
        let store = MemoryStore::new();
        let mut cfg = config(&["load"], 60_000, 2);
        cfg.orchestrator.collect_tick_ms = 20;
        let mut orch = orchestrator(cfg, &store, "host-1");
        let flushed = orch.bus().subscribe("meter.load.flushed");
        orch.start().unwrap();

        let event = flushed.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, Event::Flushed { meter: "load", samples: 2, .. }));
        orch.stop().unwrap();
        assert!(store.row_count("loads") >= 1);
    }
}
