//! Fixed-interval background task.
//!
//! The task thread sleeps on a stop channel for one interval at a time and
//! runs the tick only when the wait timed out, so a stop requested during the
//! sleep wins over the next tick. Ticks run sequentially on one thread: a new
//! tick never starts before the previous one has returned.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

pub struct Scheduler {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns a thread that calls `tick` every `interval` until stopped.
    pub fn start<T>(name: &str, interval: Duration, mut tick: T) -> io::Result<Self>
    where
        T: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("tick-{}", name))
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        // Stop requested or the scheduler was dropped.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        debug!(scheduler = name, interval_ms = interval.as_millis() as u64, "scheduler started");

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task and waits for an in-flight tick to return.
    ///
    /// No tick runs after this returns. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(scheduler = %self.name, "scheduler thread panicked");
            }
            debug!(scheduler = %self.name, "scheduler stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_ticks_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut scheduler = Scheduler::start("test", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_no_tick_after_stop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut scheduler = Scheduler::start("test", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        scheduler.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        scheduler.stop();
    }

    #[test]
    fn test_stop_waits_for_inflight_tick() {
        let in_tick = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicUsize::new(0));
        let (flag, finished) = (Arc::clone(&in_tick), Arc::clone(&done));
        let mut scheduler = Scheduler::start("slow", Duration::from_millis(1), move || {
            flag.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(40));
            finished.fetch_add(1, Ordering::SeqCst);
            flag.store(false, Ordering::SeqCst);
        })
        .unwrap();

        while !in_tick.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.stop();
        assert!(!in_tick.load(Ordering::SeqCst));
        assert!(done.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_stop_during_sleep_skips_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut scheduler = Scheduler::start("idle", Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        scheduler.stop();
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
