// src/models/mod.rs

//! Domain models for the stock checker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod history;
mod item;
mod snapshot;

// Re-export all public types
pub use config::{
    CheckConfig, Config, HistoryConfig, LivenessConfig, LoginConfig, MailConfig, NotifyConfig,
    ProberConfig, SchedulePolicy, StorageConfig, Targets,
};
pub use history::{HistoryRecord, StockStatus};
pub use item::Item;
pub use snapshot::StockSnapshot;
