//! Process-wide publish/subscribe channel between the orchestrator and meters.
//!
//! Events are typed; the dot-delimited tag returned by [`Event::tag`] is only
//! used for subscription filtering. Publishing never blocks: every matching
//! subscriber has its own unbounded queue. Events from one publisher reach a
//! given subscriber in publish order. There is no replay, so an event published
//! before a subscription exists is not delivered to it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::trace;

use crate::meter::MeterStatus;

/// Lifecycle command broadcast to every meter listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Collect,
    Stop,
}

impl Command {
    fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Collect => "collect",
            Command::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    StatusChanged {
        meter: &'static str,
        status: MeterStatus,
    },
    StartFailed {
        meter: &'static str,
        reason: String,
    },
    Flushed {
        meter: &'static str,
        samples: usize,
        rows: u64,
    },
    FlushFailed {
        meter: &'static str,
        pending: usize,
        error: String,
    },
}

/// Prefix matching every lifecycle command.
pub const COMMANDS: &str = "meter.command.";

impl Event {
    /// Hierarchical tag, e.g. `meter.command.stop` or `meter.cpu.status`.
    pub fn tag(&self) -> String {
        match self {
            Event::Command(cmd) => format!("{}{}", COMMANDS, cmd.as_str()),
            Event::StatusChanged { meter, .. } => format!("meter.{}.status", meter),
            Event::StartFailed { meter, .. } => format!("meter.{}.start_failed", meter),
            Event::Flushed { meter, .. } => format!("meter.{}.flushed", meter),
            Event::FlushFailed { meter, .. } => format!("meter.{}.flush_failed", meter),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

struct Subscriber {
    id: u64,
    prefix: String,
    tx: Sender<Event>,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Cloneable handle to the shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Delivers `event` to every live subscription whose prefix matches its tag.
    ///
    /// Returns the number of subscribers reached. Subscribers whose receiving
    /// end is gone are dropped.
    pub fn publish(&self, event: Event) -> usize {
        let tag = event.tag();
        let mut subscribers = self.subscribers();
        let mut delivered = 0;
        subscribers.retain(|s| {
            if !tag.starts_with(&s.prefix) {
                return true;
            }
            match s.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        trace!(tag = %tag, delivered, "event published");
        delivered
    }

    /// Subscribes to every event whose tag starts with `prefix` (`""` matches all).
    pub fn subscribe(&self, prefix: &str) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push(Subscriber {
            id,
            prefix: prefix.to_string(),
            tx,
        });
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers().retain(|s| s.id != id);
    }
}

/// Receiving end of a subscription. Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    rx: Receiver<Event>,
    bus: EventBus,
}

impl Subscription {
    /// Blocks until the next event. `None` once the bus is gone.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.rx.iter()
    }

    /// Explicitly ends the subscription.
    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_filters_by_prefix() {
        let bus = EventBus::new();
        let commands = bus.subscribe(COMMANDS);
        let cpu = bus.subscribe("meter.cpu.");
        let all = bus.subscribe("");

        let reached = bus.publish(Event::StatusChanged {
            meter: "cpu",
            status: MeterStatus::Waiting,
        });
        assert_eq!(reached, 2);
        assert_eq!(bus.publish(Event::Command(Command::Stop)), 2);

        assert_eq!(commands.try_recv().unwrap(), Event::Command(Command::Stop));
        assert!(commands.try_recv().is_err());
        assert!(matches!(
            cpu.try_recv().unwrap(),
            Event::StatusChanged { meter: "cpu", .. }
        ));
        assert!(cpu.try_recv().is_err());
        assert_eq!(all.iter().take(2).count(), 2);
    }

    #[test]
    fn test_publish_preserves_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe(COMMANDS);
        for cmd in [Command::Start, Command::Collect, Command::Stop] {
            bus.publish(Event::Command(cmd));
        }
        let got: Vec<Event> = sub.iter().take(3).collect();
        assert_eq!(
            got,
            vec![
                Event::Command(Command::Start),
                Event::Command(Command::Collect),
                Event::Command(Command::Stop),
            ]
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(Event::Command(Command::Collect)), 0);

        let late = bus.subscribe("");
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_close_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe("");
        let other = bus.subscribe("");
        assert_eq!(bus.subscriber_count(), 2);

        sub.close();
        drop(other);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(Event::Command(Command::Start)), 0);
    }

    #[test]
    fn test_publish_from_other_thread() {
        let bus = EventBus::new();
        let sub = bus.subscribe("meter.");
        let publisher = bus.clone();
        std::thread::spawn(move || {
            publisher.publish(Event::Flushed {
                meter: "load",
                samples: 3,
                rows: 1,
            });
        })
        .join()
        .unwrap();

        let event = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.tag(), "meter.load.flushed");
    }
}
