//! Playback notifications.
//!
//! `StateChannel` is an explicit subscriber list owned by one player. Every
//! new subscriber immediately receives the current snapshot, so a listener
//! that attaches late still sees where playback is. Subscribers whose
//! receiver was dropped are pruned on the next publish.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

use crate::config::PlaybackSpeed;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Whether `self -> next` is one of the allowed transitions
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, next),
            (Stopped, Playing) | (Playing, Paused) | (Playing, Stopped) | (Paused, Playing) | (Paused, Stopped)
        )
    }
}

/// State plus cursor, as published after every change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub cursor: usize,
    pub total: usize,
    pub speed: PlaybackSpeed,
}

impl PlaybackSnapshot {
    /// Fraction revealed in 0..=1 (1 for an empty index)
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.cursor as f32 / self.total as f32
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.total
    }
}

/// Notifications from the host application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostSignal {
    /// Host is about to stop running its event loop
    Suspended,
    /// Host is running again
    Resumed,
}

/// Push stream of snapshots with replay of the latest value.
#[derive(Debug)]
pub struct StateChannel {
    subscribers: Vec<Sender<PlaybackSnapshot>>,
    last: PlaybackSnapshot,
}

impl StateChannel {
    pub fn new(initial: PlaybackSnapshot) -> Self {
        Self {
            subscribers: Vec::new(),
            last: initial,
        }
    }

    /// New receiver, primed with the current snapshot
    pub fn subscribe(&mut self) -> Receiver<PlaybackSnapshot> {
        let (tx, rx) = unbounded();
        // Fresh unbounded channel with a live receiver: cannot fail
        let _ = tx.send(self.last);
        self.subscribers.push(tx);
        rx
    }

    /// Send to every live subscriber and remember as the latest value
    pub fn publish(&mut self, snapshot: PlaybackSnapshot) {
        self.last = snapshot;
        self.subscribers.retain(|tx| tx.send(snapshot).is_ok());
    }

    pub fn last(&self) -> PlaybackSnapshot {
        self.last
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
