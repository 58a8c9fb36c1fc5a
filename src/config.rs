// src/config.rs

//! Configuration loading utilities.
//!
//! Settings and the tracked item list live in two TOML files and are re-read
//! at the start of every round, so edits apply without a restart.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Config, Item, Targets};

/// Settings plus the items to check, as used by one round.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub config: Config,
    pub items: Vec<Item>,
}

/// Where settings come from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Re-read from disk on every reload.
    Files { config: PathBuf, targets: PathBuf },
    /// Fixed for the lifetime of the process.
    Static(Settings),
}

impl ConfigSource {
    pub fn files(config: impl Into<PathBuf>, targets: impl Into<PathBuf>) -> Self {
        Self::Files {
            config: config.into(),
            targets: targets.into(),
        }
    }

    /// Load and validate the settings.
    pub fn load(&self) -> Result<Settings> {
        match self {
            Self::Files { config, targets } => load_all(config, targets),
            Self::Static(settings) => Ok(settings.clone()),
        }
    }

    /// Reload, keeping `current` when the files are unreadable or invalid.
    pub fn reload_or_keep(&self, current: &Settings) -> Settings {
        self.load().unwrap_or_else(|e| {
            log::warn!("Config reload failed: {e}. Keeping previous settings.");
            current.clone()
        })
    }
}

/// Load and validate both config and targets.
pub fn load_all(config_path: &Path, targets_path: &Path) -> Result<Settings> {
    let config = Config::load(config_path).map_err(|e| {
        AppError::config(format!("Failed to load config from {config_path:?}: {e}"))
    })?;
    config.validate()?;

    let targets = Targets::load(targets_path).map_err(|e| {
        AppError::config(format!("Failed to load targets from {targets_path:?}: {e}"))
    })?;
    targets.validate()?;

    Ok(Settings {
        config,
        items: targets.items,
    })
}
