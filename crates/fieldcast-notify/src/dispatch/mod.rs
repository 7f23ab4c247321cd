//! Channel dispatch.
//!
//! - [`CarrierAdapter`] and its HTTP and simulated implementations
//! - [`InboxWriter`], the in-application channel
//! - [`DispatchRouter`], which picks the carrying channel and falls back to
//!   the inbox

pub mod carrier;
pub mod inbox;
pub mod router;

pub use carrier::{CarrierAdapter, CarrierReceipt, HttpCarrier, SimulatedCarrier};
pub use inbox::{InboxDraft, InboxWriter};
pub use router::{DispatchRouter, NotificationPayload, SendResult};

/// Errors from an external carrier attempt.
///
/// These never escape the router; they become the `error` of a fallback.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    /// HTTP request to the carrier failed.
    #[error("Carrier request error: {0}")]
    Request(String),

    /// Carrier answered with a non-success status.
    #[error("Carrier rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Provider configuration or recipient contact is unusable.
    #[error("Carrier configuration error: {0}")]
    Config(String),

    #[error("Carrier timed out after {0:?}")]
    Timeout(std::time::Duration),
}
