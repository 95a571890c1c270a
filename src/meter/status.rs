//! Meter lifecycle state machine.
//!
//! ```text
//! Stopped -> Starting -> Started -> Waiting
//!               |                    |  ^
//!               v                    v  |
//!            Stopped         Collecting / Aggregating
//!                                    |
//! Waiting -> Stopping -> Stopped     v
//!                                 Waiting
//! ```
//!
//! The current status lives in a [`StatusCell`]. Every transition is
//! published on the bus as [`Event::StatusChanged`] while the cell lock is
//! held, so subscribers observe transitions of one meter in order.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::trace;

use crate::bus::{Event, EventBus};
use crate::meter::MeterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeterStatus {
    Stopped,
    Starting,
    Started,
    Waiting,
    Collecting,
    Aggregating,
    Stopping,
}

impl MeterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MeterStatus::Stopped => "stopped",
            MeterStatus::Starting => "starting",
            MeterStatus::Started => "started",
            MeterStatus::Waiting => "waiting",
            MeterStatus::Collecting => "collecting",
            MeterStatus::Aggregating => "aggregating",
            MeterStatus::Stopping => "stopping",
        }
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: MeterStatus) -> bool {
        use MeterStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Started)
                | (Starting, Stopped)
                | (Started, Waiting)
                | (Waiting, Collecting)
                | (Waiting, Aggregating)
                | (Waiting, Stopping)
                | (Collecting, Waiting)
                | (Collecting, Aggregating)
                | (Aggregating, Waiting)
                | (Stopping, Stopped)
        )
    }

    /// Collecting or aggregating: work that `stop` must wait for.
    pub fn is_busy(self) -> bool {
        matches!(self, MeterStatus::Collecting | MeterStatus::Aggregating)
    }
}

impl fmt::Display for MeterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of one meter plus a condition variable for waiters.
pub struct StatusCell {
    meter: &'static str,
    bus: EventBus,
    status: Mutex<MeterStatus>,
    changed: Condvar,
}

impl StatusCell {
    pub fn new(meter: &'static str, bus: EventBus) -> Self {
        Self {
            meter,
            bus,
            status: Mutex::new(MeterStatus::Stopped),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MeterStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, current: &mut MeterStatus, next: MeterStatus) {
        trace!(meter = self.meter, from = %current, to = %next, "status transition");
        *current = next;
        self.bus.publish(Event::StatusChanged {
            meter: self.meter,
            status: next,
        });
        self.changed.notify_all();
    }

    pub fn get(&self) -> MeterStatus {
        *self.lock()
    }

    /// Moves from the current status to `next`, failing on an illegal transition.
    pub fn transition(&self, next: MeterStatus) -> Result<(), MeterError> {
        let mut current = self.lock();
        if !current.can_transition_to(next) {
            return Err(MeterError::InvalidTransition {
                meter: self.meter.to_string(),
                from: *current,
                to: next,
            });
        }
        self.apply(&mut current, next);
        Ok(())
    }

    /// Atomically moves `from -> next` if the status is exactly `from`.
    ///
    /// Returns `false` (and changes nothing) otherwise.
    pub fn claim(&self, from: MeterStatus, next: MeterStatus) -> bool {
        let mut current = self.lock();
        if *current != from || !from.can_transition_to(next) {
            return false;
        }
        self.apply(&mut current, next);
        true
    }

    /// Waits for in-flight collect/aggregate work, then enters `Stopping`.
    ///
    /// Returns `Ok(false)` when the meter is already stopped or stopping.
    pub fn begin_stop(&self) -> Result<bool, MeterError> {
        let mut current = self.lock();
        while current.is_busy() {
            current = self
                .changed
                .wait(current)
                .unwrap_or_else(|e| e.into_inner());
        }
        match *current {
            MeterStatus::Stopped | MeterStatus::Stopping => Ok(false),
            MeterStatus::Waiting => {
                self.apply(&mut current, MeterStatus::Stopping);
                Ok(true)
            }
            other => Err(MeterError::InvalidTransition {
                meter: self.meter.to_string(),
                from: other,
                to: MeterStatus::Stopping,
            }),
        }
    }
}
