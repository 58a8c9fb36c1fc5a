//! Append-only transition log.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{AppError, Result};
use crate::models::{HistoryConfig, HistoryRecord, Item, StockSnapshot, StockStatus};
use crate::pipeline::diff::transitions;

/// Writes one CSV row per item whose state flipped between two rounds.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    path: PathBuf,
    offset: FixedOffset,
    date_format: String,
    time_format: String,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>, config: &HistoryConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            AppError::config(format!(
                "invalid history.utc_offset_hours: {}",
                config.utc_offset_hours
            ))
        })?;

        Ok(Self {
            path: path.into(),
            offset,
            date_format: config.date_format.clone(),
            time_format: config.time_format.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the rows for one round; every row shares the round's timestamp.
    ///
    /// Rows follow the order of `items`.
    pub fn records(
        &self,
        at: DateTime<Utc>,
        items: &[Item],
        current: &StockSnapshot,
        previous: &StockSnapshot,
    ) -> Result<Vec<HistoryRecord>> {
        let local = at.with_timezone(&self.offset);
        let date = format_time(&local, &self.date_format)?;
        let time = format_time(&local, &self.time_format)?;

        let mut changed = transitions(previous, current);
        changed.sort_by_key(|t| items.iter().position(|item| item.name == t.name));

        Ok(changed
            .into_iter()
            .map(|t| HistoryRecord {
                date: date.clone(),
                time: time.clone(),
                item_name: t.name,
                status: StockStatus::from(t.in_stock),
            })
            .collect())
    }

    /// Append the transitions between `previous` and `current`.
    ///
    /// Returns the number of rows written.
    pub fn append(
        &self,
        at: DateTime<Utc>,
        items: &[Item],
        current: &StockSnapshot,
        previous: &StockSnapshot,
    ) -> Result<usize> {
        let records = self.records(at, items, current, previous)?;
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for record in &records {
            writer.serialize(record)?;
            log::info!(
                "History: {} -> {} ({} {})",
                record.item_name,
                record.status,
                record.date,
                record.time
            );
        }
        writer.flush()?;

        Ok(records.len())
    }
}

/// Format `at` with a strftime pattern, rejecting unknown specifiers.
fn format_time(at: &DateTime<FixedOffset>, pattern: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", at.format(pattern))
        .map_err(|_| AppError::config(format!("invalid history time format '{pattern}'")))?;
    Ok(out)
}
