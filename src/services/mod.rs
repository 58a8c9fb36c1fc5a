//! Service layer for the stock checker.
//!
//! This module contains the collaborators driven by the poll loop:
//! - Stock probing (`StockProber`, `HttpProber`)
//! - Sign-in code entry (`CodePrompt`)
//! - Rate-limited notification (`Notifier`, `Transport`)
//! - Transition history (`HistoryRecorder`)

pub mod auth;
pub mod history;
pub mod notifier;
pub mod prober;
pub mod throttle;

pub use auth::{CodePrompt, NonInteractive, StdinPrompt};
pub use history::HistoryRecorder;
pub use notifier::{NotifyOutcome, Notifier, SmtpMailer, Transport, compose_message};
pub use prober::{HttpProber, StockProber};
pub use throttle::ThrottleMarker;
