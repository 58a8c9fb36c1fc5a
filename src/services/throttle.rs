//! Notification cooldown tracked through a marker file's mtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::Result;
use crate::models::NotifyConfig;

/// Marker file recording when the last notification went out.
#[derive(Debug, Clone)]
pub struct ThrottleMarker {
    path: PathBuf,
    cooldown: Duration,
}

impl ThrottleMarker {
    pub fn new(path: impl Into<PathBuf>, cooldown: Duration) -> Self {
        Self {
            path: path.into(),
            cooldown,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(&config.marker_path, config.cooldown())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last successful send, if the marker exists.
    pub fn last_sent(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Time left before another send is allowed, or `None` when sending is allowed.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        let last = self.last_sent()?;
        // An mtime in the future counts as "just sent".
        let elapsed = now.duration_since(last).unwrap_or(Duration::ZERO);
        self.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Create the marker if needed and set its mtime to `now`.
    pub fn touch(&self, now: SystemTime) -> Result<()> {
        crate::utils::fs::touch(&self.path, now)
    }
}
