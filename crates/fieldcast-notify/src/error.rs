//! Engine error taxonomy.

use fieldcast_core::db::DatabaseError;

/// Errors surfaced by the notification engine.
///
/// Carrier failures are absent on purpose: they degrade to in-application
/// delivery inside the router and only show up in the delivery log.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The target farm has no qualifying recipients. Nothing was written.
    #[error("Farm {farm_id} has no qualifying recipients")]
    EmptyAudience { farm_id: String },

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Message {message_id} has no recipient record for {recipient_id}")]
    UnknownRecipientRecord {
        message_id: String,
        recipient_id: String,
    },

    /// Transient data-source failure, propagated unchanged.
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    /// The membership provider could not resolve an audience.
    #[error("Membership lookup failed: {0}")]
    Membership(String),

    /// The in-application channel itself failed. There is no further fallback.
    #[error("In-application delivery failed: {0}")]
    Inbox(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<fieldcast_core::Error> for NotifyError {
    fn from(e: fieldcast_core::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
