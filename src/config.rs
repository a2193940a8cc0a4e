//! Application settings persisted as `inkplay.json`.
//!
//! The speed table is the only playback input the user can tune; each named
//! speed maps to a fixed tick interval and a per-tick cursor advance. Pacing
//! is synthetic: it never looks at the real stroke timestamps.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::timed_index::DEFAULT_PARALLEL_THRESHOLD;
use crate::entities::canvas::DEFAULT_MAX_GROUPS;
use crate::entities::paint::Color;

/// Named replay speeds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 3] = [PlaybackSpeed::Slow, PlaybackSpeed::Normal, PlaybackSpeed::Fast];

    pub fn name(self) -> &'static str {
        match self {
            PlaybackSpeed::Slow => "slow",
            PlaybackSpeed::Normal => "normal",
            PlaybackSpeed::Fast => "fast",
        }
    }
}

/// Timer period and cursor advance for one speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub interval_ms: u64,
    pub step: usize,
}

impl SpeedProfile {
    pub const fn new(interval_ms: u64, step: usize) -> Self {
        Self { interval_ms, step }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Elements revealed per second
    pub fn rate(&self) -> f64 {
        if self.interval_ms == 0 {
            return f64::INFINITY;
        }
        self.step as f64 * 1000.0 / self.interval_ms as f64
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("speed '{speed}' has a zero tick interval")]
    ZeroInterval { speed: &'static str },
    #[error("speed '{speed}' advances zero elements per tick")]
    ZeroStep { speed: &'static str },
    #[error("speed '{faster}' ({faster_rate:.1}/s) is not faster than '{slower}' ({slower_rate:.1}/s)")]
    NotIncreasing {
        slower: &'static str,
        faster: &'static str,
        slower_rate: f64,
        faster_rate: f64,
    },
}

/// Mapping from `PlaybackSpeed` to `SpeedProfile`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    pub slow: SpeedProfile,
    pub normal: SpeedProfile,
    pub fast: SpeedProfile,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            slow: SpeedProfile::new(80, 1),
            normal: SpeedProfile::new(40, 1),
            fast: SpeedProfile::new(40, 2),
        }
    }
}

impl SpeedTable {
    pub fn profile(&self, speed: PlaybackSpeed) -> SpeedProfile {
        match speed {
            PlaybackSpeed::Slow => self.slow,
            PlaybackSpeed::Normal => self.normal,
            PlaybackSpeed::Fast => self.fast,
        }
    }

    /// Check that every entry ticks and advances, and that rates strictly
    /// increase from slow to fast.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for speed in PlaybackSpeed::ALL {
            let p = self.profile(speed);
            if p.interval_ms == 0 {
                return Err(ConfigError::ZeroInterval { speed: speed.name() });
            }
            if p.step == 0 {
                return Err(ConfigError::ZeroStep { speed: speed.name() });
            }
        }
        for pair in PlaybackSpeed::ALL.windows(2) {
            let (slower, faster) = (pair[0], pair[1]);
            let (slower_rate, faster_rate) = (self.profile(slower).rate(), self.profile(faster).rate());
            if faster_rate <= slower_rate {
                return Err(ConfigError::NotIncreasing {
                    slower: slower.name(),
                    faster: faster.name(),
                    slower_rate,
                    faster_rate,
                });
            }
        }
        Ok(())
    }
}

/// Persistent settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub speeds: SpeedTable,
    pub default_speed: PlaybackSpeed,
    pub canvas_width: usize,
    pub canvas_height: usize,
    pub background: Color,
    /// Offscreen group budget of the render canvas
    pub max_offscreen_groups: usize,
    /// Index size from which sorting runs on rayon
    pub parallel_sort_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speeds: SpeedTable::default(),
            default_speed: PlaybackSpeed::Normal,
            canvas_width: 640,
            canvas_height: 480,
            background: Color::WHITE,
            max_offscreen_groups: DEFAULT_MAX_GROUPS,
            parallel_sort_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or
    /// invalid. Never fails.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(settings) => {
                info!("Settings loaded from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.speeds.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.speeds.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("inkplay_{}_{}.json", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_default_table_is_valid_and_increasing() {
        let table = SpeedTable::default();
        assert_eq!(table.validate(), Ok(()));
        assert!(table.profile(PlaybackSpeed::Slow).rate() < table.profile(PlaybackSpeed::Normal).rate());
        assert!(table.profile(PlaybackSpeed::Normal).rate() < table.profile(PlaybackSpeed::Fast).rate());
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let mut table = SpeedTable::default();
        table.normal.interval_ms = 0;
        assert_eq!(table.validate(), Err(ConfigError::ZeroInterval { speed: "normal" }));

        let mut table = SpeedTable::default();
        table.fast.step = 0;
        assert_eq!(table.validate(), Err(ConfigError::ZeroStep { speed: "fast" }));

        // Fast no faster than normal
        let mut table = SpeedTable::default();
        table.fast = table.normal;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::NotIncreasing { slower: "normal", faster: "fast", .. })
        ));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"default_speed":"fast","speeds":{"slow":{"interval_ms":100,"step":1}}}"#)
                .unwrap();
        assert_eq!(settings.default_speed, PlaybackSpeed::Fast);
        assert_eq!(settings.speeds.slow, SpeedProfile::new(100, 1));
        assert_eq!(settings.speeds.fast, SpeedTable::default().fast);
        assert_eq!(settings.canvas_width, 640);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = temp_path("settings");
        let mut settings = Settings::default();
        settings.default_speed = PlaybackSpeed::Slow;
        settings.canvas_width = 320;
        settings.save(&path).unwrap();

        let back = Settings::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, settings);
    }

    #[test]
    fn test_missing_or_invalid_falls_back() {
        assert_eq!(Settings::load(Path::new("/no/such/inkplay.json")), Settings::default());

        let path = temp_path("broken");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());

        // Parses, but the table is invalid
        std::fs::write(&path, r#"{"speeds":{"normal":{"interval_ms":0,"step":1}}}"#).unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
        let _ = std::fs::remove_file(&path);
    }
}
