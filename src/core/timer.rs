//! Repeating timers behind a small scheduler trait.
//!
//! The player never sleeps or spawns threads itself; it asks a [`Scheduler`]
//! to call a tick function every `interval` and keeps the returned
//! [`TimerHandle`]. Dropping the handle disarms the timer.
//!
//! Disarming is a request, not a barrier: a tick that is already running (or
//! about to run) on the timer thread may still arrive afterwards. Callers
//! must make such ticks harmless - the player does it with a generation
//! token captured by every tick closure.
//!
//! Implementations:
//! - [`ThreadScheduler`] - one named thread per armed timer, driven by
//!   `crossbeam_channel::tick`
//! - [`ManualScheduler`] - ticks only when the test calls `fire()`

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick};
use log::trace;
use thiserror::Error;

/// Tick callback shared between scheduler and timer
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Source of repeating timers.
pub trait Scheduler: Send + Sync {
    /// Call `tick` every `interval` until the returned handle is dropped
    fn arm(&self, interval: Duration, tick: TickFn) -> Result<TimerHandle, TimerError>;
}

/// Single owner of an armed timer. Drop (or `disarm()`) to stop it.
pub struct TimerHandle {
    id: u64,
    disarm: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(id: u64, disarm: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            disarm: Some(Box::new(disarm)),
        }
    }

    /// Scheduler-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn disarm(mut self) {
        self.run_disarm();
    }

    fn run_disarm(&mut self) {
        if let Some(disarm) = self.disarm.take() {
            disarm();
            trace!("Timer {} disarmed", self.id);
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.run_disarm();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("armed", &self.disarm.is_some())
            .finish()
    }
}

/// Wall-clock timers, one thread each.
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    next_id: AtomicU64,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ThreadScheduler {
    fn arm(&self, interval: Duration, tick_fn: TickFn) -> Result<TimerHandle, TimerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Dropping the sender disconnects `stop_rx` and ends the loop
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let interval = interval.max(Duration::from_millis(1));

        thread::Builder::new()
            .name(format!("inkplay-timer-{}", id))
            .spawn(move || {
                trace!("Timer {} started ({:?})", id, interval);
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => tick_fn(),
                        recv(stop_rx) -> _ => break,
                    }
                }
                trace!("Timer {} stopped", id);
            })?;

        Ok(TimerHandle::new(id, move || drop(stop_tx)))
    }
}

/// One timer registered with a `ManualScheduler`
struct ManualTimer {
    interval: Duration,
    tick: TickFn,
    armed: Arc<AtomicBool>,
}

/// Deterministic scheduler: nothing happens until `fire()`.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<Vec<ManualTimer>>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("armed", &self.armed_count())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every armed timer once. Returns how many fired.
    pub fn fire(&self) -> usize {
        // Collect first: ticks may arm or disarm timers
        let ticks: Vec<TickFn> = self
            .lock()
            .iter()
            .filter(|t| t.armed.load(Ordering::SeqCst))
            .map(|t| Arc::clone(&t.tick))
            .collect();
        for tick in &ticks {
            tick();
        }
        ticks.len()
    }

    /// Fire until no timer is armed or `max_rounds` is reached.
    /// Returns the number of rounds that fired at least one timer.
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.fire() > 0 {
            rounds += 1;
        }
        rounds
    }

    pub fn armed_count(&self) -> usize {
        self.lock().iter().filter(|t| t.armed.load(Ordering::SeqCst)).count()
    }

    /// Interval of the most recently armed timer that is still armed
    pub fn armed_interval(&self) -> Option<Duration> {
        self.lock()
            .iter()
            .rev()
            .find(|t| t.armed.load(Ordering::SeqCst))
            .map(|t| t.interval)
    }

    /// Tick of the most recently armed timer, armed or not.
    /// Calling it after a disarm models a tick that was already in flight.
    pub fn last_tick(&self) -> Option<TickFn> {
        self.lock().last().map(|t| Arc::clone(&t.tick))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ManualTimer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&self, interval: Duration, tick: TickFn) -> Result<TimerHandle, TimerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let armed = Arc::new(AtomicBool::new(true));
        self.lock().push(ManualTimer {
            interval,
            tick,
            armed: Arc::clone(&armed),
        });

        Ok(TimerHandle::new(id, move || armed.store(false, Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, TickFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_manual_fire_and_disarm() {
        let scheduler = ManualScheduler::new();
        let (count, tick) = counter();
        let handle = scheduler.arm(Duration::from_millis(10), tick).unwrap();

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.armed_interval(), Some(Duration::from_millis(10)));

        drop(handle);
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(scheduler.armed_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // A stale tick can still be invoked by hand
        scheduler.last_tick().unwrap()();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_thread_scheduler_ticks_until_dropped() {
        let scheduler = ThreadScheduler::new();
        let (count, tick) = counter();
        let handle = scheduler.arm(Duration::from_millis(5), tick).unwrap();

        thread::sleep(Duration::from_millis(60));
        handle.disarm();
        let after_disarm = count.load(Ordering::SeqCst);
        assert!(after_disarm > 0);

        // At most one in-flight tick may land after disarm
        thread::sleep(Duration::from_millis(40));
        assert!(count.load(Ordering::SeqCst) <= after_disarm + 1);
    }
}
