//! Fieldcast Core Library
//!
//! Shared functionality for Fieldcast components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Delivery channel and priority enumerations
//! - Tracing initialisation
//! - Common error types

pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use channel::{ChannelType, Priority};
pub use config::Config;
pub use error::{Error, Result};
