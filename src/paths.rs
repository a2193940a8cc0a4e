//! Where settings and logs live.
//!
//! Resolution order for both directories:
//! 1. `--config-dir` on the command line
//! 2. `INKPLAY_CONFIG_DIR` environment variable
//! 3. Current folder, if it already holds `inkplay.json` or `inkplay.log`
//! 4. Platform directory from dirs-next (`~/.config/inkplay`,
//!    `~/.local/share/inkplay` on Linux)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "inkplay";
pub const SETTINGS_FILE: &str = "inkplay.json";
pub const LOG_FILE: &str = "inkplay.log";
pub const CONFIG_DIR_ENV: &str = "INKPLAY_CONFIG_DIR";

/// Directory override from CLI or environment
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// CLI value wins over `INKPLAY_CONFIG_DIR`
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(dirs_next::data_dir())
    }

    /// Full path of the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join(SETTINGS_FILE)
    }

    /// Default log file location
    pub fn log_file(&self) -> PathBuf {
        self.data_dir().join(LOG_FILE)
    }

    /// Create config and data directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        let config_dir = self.config_dir();
        let data_dir = self.data_dir();
        for dir in [&config_dir, &data_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    fn resolve(&self, platform: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(cwd) = std::env::current_dir()
            && has_local_files(&cwd)
        {
            return cwd;
        }
        platform
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}
