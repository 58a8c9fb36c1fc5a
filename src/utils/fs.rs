//! Filesystem helpers.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;

/// Create `path` if missing and set its modification time to `at`.
///
/// Existing content is left as is.
pub fn touch(path: &Path, at: SystemTime) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.set_modified(at)?;
    Ok(())
}
