//! `SQLite` storage for the Fieldcast notification engine.
//!
//! Provides persistence for broadcast messages, per-recipient read state,
//! the delivery log, channel providers, and the in-application inbox.

mod db;
mod models;
mod queries_delivery;
mod queries_inbox;
mod queries_messages;
mod queries_providers;
mod queries_stats;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, NotifyDatabase};
pub use models::*;
pub use queries_delivery::NewDeliveryLog;
pub use queries_inbox::NewInboxNotification;
pub use queries_messages::{NewMessage, NewRecipient, ReadTransition};
pub use queries_providers::ProviderParams;
pub use queries_stats::{ChannelOutcomeCount, SenderTotals, SystemTotals};
