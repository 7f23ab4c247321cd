//! Read-receipt tracking.

use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::NotifyError;
use crate::storage::{InboxEntry, NotifyDatabase, ReadTransition};

/// Records when recipients open broadcasts.
#[derive(Clone)]
pub struct ReadReceiptTracker {
    db: NotifyDatabase,
    clock: Arc<dyn Clock>,
}

impl ReadReceiptTracker {
    pub fn new(db: NotifyDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Mark a message read for one recipient.
    ///
    /// Repeating the call is a no-op. Concurrent calls for the same pair
    /// produce a single transition and a single `read_count` increment.
    pub async fn mark_read(&self, message_id: &str, recipient_id: &str) -> Result<(), NotifyError> {
        match self
            .db
            .mark_recipient_read(message_id, recipient_id, self.clock.now())
            .await?
        {
            ReadTransition::Marked => {
                info!(message_id, recipient_id, "Message marked read");
                Ok(())
            }
            ReadTransition::AlreadyRead => {
                debug!(message_id, recipient_id, "Message already read");
                Ok(())
            }
            ReadTransition::MissingRecord => Err(NotifyError::UnknownRecipientRecord {
                message_id: message_id.to_string(),
                recipient_id: recipient_id.to_string(),
            }),
            ReadTransition::MissingMessage => {
                Err(NotifyError::UnknownMessage(message_id.to_string()))
            }
        }
    }

    /// Messages addressed to a recipient, newest first, with read state.
    ///
    /// The stream is lazy and can be consumed once.
    pub fn messages_for_recipient<'a>(
        &'a self,
        recipient_id: &'a str,
    ) -> impl Stream<Item = Result<InboxEntry, NotifyError>> + Send + 'a {
        self.db
            .stream_messages_for_recipient(recipient_id)
            .map(|entry| entry.map_err(NotifyError::from))
    }
}
