//! Fieldcast Notification Engine
//!
//! Core functionality for farm-investor messaging:
//! - SQLite storage for broadcasts, recipient read state, delivery log,
//!   channel providers and the in-application inbox
//! - Channel provider registry and dispatch router with inbox fallback
//! - Broadcast composer with bounded per-recipient fan-out
//! - Read-receipt tracking and statistics

pub mod broadcast;
pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod receipts;
pub mod registry;
pub mod stats;
pub mod storage;

pub use engine::{EngineBuilder, NotificationEngine};
pub use error::{NotifyError, Result};
