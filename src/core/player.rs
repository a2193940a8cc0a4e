//! Playback state machine: replays a drawing stroke by stroke.
//!
//! # States
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --play--> Playing
//!                   Playing --stop---> Stopped
//!                   Paused  --stop---> Stopped
//!                   Playing --cursor reaches N--> Stopped
//! ```
//!
//! Anything else is an ignored transition: logged at debug level, counted in
//! `Diagnostics`, and otherwise a no-op.
//!
//! # Cursor
//!
//! The cursor counts how many entries of the `TimedIndex` are revealed, in
//! `0..=N`. `play()` from `Stopped` rewinds to 0, from `Paused` resumes.
//! `stop()` keeps the cursor so the last frame stays on screen.
//!
//! # Timer generations
//!
//! Every arm and disarm bumps `generation`. A tick closure captures the
//! generation it was armed with and drops itself when the session has moved
//! on, so a tick already in flight during `pause()` or `stop()` can never
//! advance the cursor afterwards.
//!
//! # Threading
//!
//! `Player` is a cheap handle over shared session state. Ticks arrive on the
//! scheduler's thread, host signals on the `listen()` thread, and commands
//! on the caller's thread; all of them serialize on one mutex, and snapshots
//! are published while it is held so subscribers see transitions in order.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use log::{debug, info, trace, warn};

use super::events::{HostSignal, PlaybackSnapshot, PlaybackState, StateChannel};
use super::timed_index::TimedIndex;
use super::timer::{Scheduler, TickFn, TimerHandle};
use crate::config::{PlaybackSpeed, Settings, SpeedTable};
use crate::entities::compositor::RevealSet;
use crate::entities::layer::Layer;

/// Outcome of a playback command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Transition::Applied
    }
}

/// Counters for recovered, non-fatal conditions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Commands that were not valid in the current state
    pub ignored_transitions: u64,
    /// Ticks that arrived for a timer generation that was already retired
    pub stale_ticks: u64,
    /// Timers armed over the player's lifetime
    pub timers_armed: u64,
    /// Timers the scheduler failed to arm (playback paused instead)
    pub arm_failures: u64,
}

struct Session {
    state: PlaybackState,
    cursor: usize,
    speed: PlaybackSpeed,
    speeds: SpeedTable,
    index: Arc<TimedIndex>,
    generation: u64,
    timer: Option<TimerHandle>,
    channel: StateChannel,
    diagnostics: Diagnostics,
}

impl Session {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            cursor: self.cursor,
            total: self.index.len(),
            speed: self.speed,
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.channel.publish(snapshot);
    }

    fn set_state(&mut self, next: PlaybackState) {
        debug!(
            "Playback {:?} -> {:?} at {}/{}",
            self.state,
            next,
            self.cursor,
            self.index.len()
        );
        self.state = next;
    }

    /// Retire the current generation and drop the timer
    fn disarm(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.disarm();
        }
    }

    fn ignore(&mut self, op: &str) -> Transition {
        debug!("Ignored {} while {:?}", op, self.state);
        self.diagnostics.ignored_transitions += 1;
        Transition::Ignored
    }
}

struct Shared {
    session: Mutex<Session>,
    scheduler: Arc<dyn Scheduler>,
    parallel_threshold: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to one playback session. Clones share the session.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("snapshot", &self.snapshot()).finish()
    }
}

impl Player {
    pub fn new(settings: &Settings, scheduler: Arc<dyn Scheduler>) -> Self {
        let session = Session {
            state: PlaybackState::Stopped,
            cursor: 0,
            speed: settings.default_speed,
            speeds: settings.speeds,
            index: Arc::new(TimedIndex::default()),
            generation: 0,
            timer: None,
            channel: StateChannel::new(PlaybackSnapshot {
                speed: settings.default_speed,
                ..PlaybackSnapshot::default()
            }),
            diagnostics: Diagnostics::default(),
        };
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                scheduler,
                parallel_threshold: settings.parallel_sort_threshold,
            }),
        }
    }

    /// Rebuild the index from `layers`, stop, and rewind to 0.
    pub fn load(&self, layers: &[Layer]) {
        let index = Arc::new(TimedIndex::build_with_threshold(layers, self.shared.parallel_threshold));

        let mut s = self.shared.lock();
        s.disarm();
        if s.state != PlaybackState::Stopped {
            s.set_state(PlaybackState::Stopped);
        }
        s.index = index;
        s.cursor = 0;
        info!("Loaded {} elements from {} layers", s.index.len(), layers.len());
        s.publish();
    }

    /// Start (from `Stopped`, rewinding) or resume (from `Paused`).
    pub fn play(&self, speed: PlaybackSpeed) -> Transition {
        let mut s = self.shared.lock();
        match s.state {
            PlaybackState::Playing => return s.ignore("play"),
            PlaybackState::Stopped => s.cursor = 0,
            PlaybackState::Paused => {}
        }
        s.speed = speed;
        s.set_state(PlaybackState::Playing);
        s.publish();

        if s.cursor >= s.index.len() {
            // Nothing left to reveal
            s.set_state(PlaybackState::Stopped);
            s.publish();
            return Transition::Applied;
        }
        self.arm(&mut s);
        Transition::Applied
    }

    pub fn pause(&self) -> Transition {
        let mut s = self.shared.lock();
        if s.state != PlaybackState::Playing {
            return s.ignore("pause");
        }
        s.disarm();
        s.set_state(PlaybackState::Paused);
        s.publish();
        Transition::Applied
    }

    /// Stop playback. The cursor is kept.
    pub fn stop(&self) -> Transition {
        let mut s = self.shared.lock();
        if s.state == PlaybackState::Stopped {
            return s.ignore("stop");
        }
        s.disarm();
        s.set_state(PlaybackState::Stopped);
        s.publish();
        Transition::Applied
    }

    /// Change speed; a running timer is re-armed under a new generation.
    pub fn set_speed(&self, speed: PlaybackSpeed) {
        let mut s = self.shared.lock();
        if s.speed == speed {
            return;
        }
        s.speed = speed;
        if s.state == PlaybackState::Playing {
            self.arm(&mut s);
        }
        debug!("Playback speed -> {}", speed.name());
        s.publish();
    }

    /// Move the cursor (clamped to 0..=N). Not allowed while playing.
    pub fn seek(&self, cursor: usize) -> Transition {
        let mut s = self.shared.lock();
        if s.state == PlaybackState::Playing {
            return s.ignore("seek");
        }
        s.cursor = cursor.min(s.index.len());
        trace!("Seek to {}/{}", s.cursor, s.index.len());
        s.publish();
        Transition::Applied
    }

    /// Move the cursor by `delta` elements. Not allowed while playing.
    pub fn step(&self, delta: isize) -> Transition {
        let mut s = self.shared.lock();
        if s.state == PlaybackState::Playing {
            return s.ignore("step");
        }
        s.cursor = s.cursor.saturating_add_signed(delta).min(s.index.len());
        trace!("Step to {}/{}", s.cursor, s.index.len());
        s.publish();
        Transition::Applied
    }

    /// Receiver primed with the current snapshot
    pub fn subscribe(&self) -> Receiver<PlaybackSnapshot> {
        self.shared.lock().channel.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state
    }

    pub fn cursor(&self) -> usize {
        self.shared.lock().cursor
    }

    pub fn progress(&self) -> f32 {
        self.snapshot().progress()
    }

    /// Current index (shared, immutable)
    pub fn index(&self) -> Arc<TimedIndex> {
        Arc::clone(&self.shared.lock().index)
    }

    /// Ids of the elements revealed so far
    pub fn visible_set(&self) -> RevealSet {
        let s = self.shared.lock();
        s.index.reveal_set(s.cursor)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.shared.lock().diagnostics
    }

    /// React to the host application. Suspending pauses a running playback;
    /// resuming never restarts it.
    pub fn on_host_signal(&self, signal: HostSignal) {
        match signal {
            HostSignal::Suspended => {
                let mut s = self.shared.lock();
                if s.state == PlaybackState::Playing {
                    info!("Host suspended, pausing playback at {}/{}", s.cursor, s.index.len());
                    s.disarm();
                    s.set_state(PlaybackState::Paused);
                    s.publish();
                }
            }
            HostSignal::Resumed => debug!("Host resumed"),
        }
    }

    /// Forward host signals from `signals` on a background thread. The
    /// thread ends when the sender side disconnects or the player is gone.
    pub fn listen(&self, signals: Receiver<HostSignal>) -> std::io::Result<JoinHandle<()>> {
        let weak = Arc::downgrade(&self.shared);
        thread::Builder::new()
            .name("inkplay-host-signals".into())
            .spawn(move || {
                for signal in signals.iter() {
                    let Some(shared) = weak.upgrade() else { break };
                    Player { shared }.on_host_signal(signal);
                }
                debug!("Host signal listener stopped");
            })
    }

    /// Arm a timer for the current speed. If the scheduler refuses, playback
    /// drops to `Paused` so it never sits in `Playing` without ticks.
    fn arm(&self, s: &mut Session) {
        s.disarm();
        let generation = s.generation;
        let profile = s.speeds.profile(s.speed);
        let weak = Arc::downgrade(&self.shared);
        let tick: TickFn = Arc::new(move || on_tick(&weak, generation));
        match self.shared.scheduler.arm(profile.interval(), tick) {
            Ok(timer) => {
                s.timer = Some(timer);
                s.diagnostics.timers_armed += 1;
                trace!(
                    "Armed generation {} ({}ms, step {})",
                    generation,
                    profile.interval_ms,
                    profile.step
                );
            }
            Err(e) => {
                warn!("Playback paused: {}", e);
                s.diagnostics.arm_failures += 1;
                s.disarm();
                s.set_state(PlaybackState::Paused);
                s.publish();
            }
        }
    }
}

fn on_tick(shared: &Weak<Shared>, generation: u64) {
    let Some(shared) = shared.upgrade() else { return };
    let mut s = shared.lock();
    if s.generation != generation || s.state != PlaybackState::Playing {
        trace!("Stale tick (generation {}, current {})", generation, s.generation);
        s.diagnostics.stale_ticks += 1;
        return;
    }

    let total = s.index.len();
    let step = s.speeds.profile(s.speed).step;
    s.cursor = (s.cursor + step).min(total);
    if s.cursor >= total {
        s.disarm();
        s.set_state(PlaybackState::Stopped);
    }
    s.publish();
}
