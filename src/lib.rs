// src/lib.rs

//! Stock Checker Library
//!
//! Polls product pages, keeps the last known stock state, records
//! transitions and mails a rate-limited notice when anything changes.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
