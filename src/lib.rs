//! INKPLAY - stroke-by-stroke drawing replay library
//!
//! Re-exports the engine for the `inkplay` binary and host applications.

// Playback engine (index, timers, player, render driver)
pub mod core;

// Drawing model and rendering
pub mod entities;

// App modules
pub mod cli;
pub mod config;
pub mod paths;

pub use crate::config::{PlaybackSpeed, Settings, SpeedProfile, SpeedTable};
pub use crate::core::driver::RenderDriver;
pub use crate::core::events::{HostSignal, PlaybackSnapshot, PlaybackState};
pub use crate::core::player::{Diagnostics, Player, Transition};
pub use crate::core::timed_index::{ElementRef, TimedIndex};
pub use crate::core::timer::{ManualScheduler, Scheduler, ThreadScheduler};
pub use crate::entities::{Canvas, Compositor, Document, Element, Layer, MaskMode};
