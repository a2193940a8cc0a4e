//! Core engine modules - index, timers, events, player, driver
//!
//! These modules form the playback engine, independent of any UI.

pub mod driver;
pub mod events;
pub mod player;
pub mod timed_index;
pub mod timer;
