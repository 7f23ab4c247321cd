//! Message and recipient-record queries.

use tokio_stream::{Stream, StreamExt};

use super::db::{DatabaseError, NotifyDatabase};
use super::models::{InboxEntry, Message, RecipientRecord};

/// Parameters for creating a broadcast message.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub farm_id: &'a str,
    pub sender_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub summary: Option<&'a str>,
    pub media_refs: &'a str,
    pub sent_at: i64,
}

/// One recipient row created together with its message.
#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub id: String,
    pub recipient_id: String,
    pub membership_id: String,
}

/// Result of a conditional unread→read transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTransition {
    /// The record flipped to read and the message counter was incremented.
    Marked,
    /// The record was already read; nothing changed.
    AlreadyRead,
    /// The message exists but has no record for this recipient.
    MissingRecord,
    /// No such message.
    MissingMessage,
}

impl NotifyDatabase {
    // =========================================================================
    // Message queries
    // =========================================================================

    /// Create a message and all of its recipient records in one transaction.
    ///
    /// `recipient_count` is set to `recipients.len()` and `read_count` to 0.
    /// Either every row is written or none is.
    pub async fn create_message_with_recipients(
        &self,
        params: &NewMessage<'_>,
        recipients: &[NewRecipient],
    ) -> Result<Message, DatabaseError> {
        let recipient_count = i64::try_from(recipients.len())
            .map_err(|e| DatabaseError::Query(format!("recipient count overflow: {e}")))?;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, farm_id, sender_id, title, body, summary, media_refs, sent_at, recipient_count, read_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(params.id)
        .bind(params.farm_id)
        .bind(params.sender_id)
        .bind(params.title)
        .bind(params.body)
        .bind(params.summary)
        .bind(params.media_refs)
        .bind(params.sent_at)
        .bind(recipient_count)
        .execute(&mut *tx)
        .await?;

        for recipient in recipients {
            sqlx::query(
                "INSERT INTO message_recipients (id, message_id, recipient_id, membership_id, is_read) \
                 VALUES (?, ?, ?, ?, 0)",
            )
            .bind(&recipient.id)
            .bind(params.id)
            .bind(&recipient.recipient_id)
            .bind(&recipient.membership_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_message(params.id).await
    }

    /// Get a message by ID.
    pub async fn get_message(&self, id: &str) -> Result<Message, DatabaseError> {
        self.find_message(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Message {id}")))
    }

    /// Get a message by ID, or `None` if it does not exist.
    pub async fn find_message(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(message)
    }

    /// List messages sent to a farm, newest first.
    pub async fn list_messages_for_farm(&self, farm_id: &str) -> Result<Vec<Message>, DatabaseError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE farm_id = ? ORDER BY sent_at DESC, rowid DESC",
        )
        .bind(farm_id)
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }

    /// List messages authored by a sender, newest first.
    pub async fn list_messages_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Vec<Message>, DatabaseError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE sender_id = ? ORDER BY sent_at DESC, rowid DESC",
        )
        .bind(sender_id)
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }

    /// Count messages sent to a farm.
    pub async fn count_messages_for_farm(&self, farm_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE farm_id = ?")
            .bind(farm_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    // =========================================================================
    // Recipient record queries
    // =========================================================================

    /// List the recipient records of a message.
    pub async fn list_recipient_records(
        &self,
        message_id: &str,
    ) -> Result<Vec<RecipientRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, RecipientRecord>(
            "SELECT * FROM message_recipients WHERE message_id = ? ORDER BY rowid ASC",
        )
        .bind(message_id)
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    /// Get the record addressing `recipient_id` for `message_id`.
    pub async fn get_recipient_record(
        &self,
        message_id: &str,
        recipient_id: &str,
    ) -> Result<Option<RecipientRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, RecipientRecord>(
            "SELECT * FROM message_recipients WHERE message_id = ? AND recipient_id = ?",
        )
        .bind(message_id)
        .bind(recipient_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    /// Count recipient records, optionally for one message.
    pub async fn count_recipient_records(
        &self,
        message_id: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = if let Some(message_id) = message_id {
            sqlx::query_as("SELECT COUNT(*) FROM message_recipients WHERE message_id = ?")
                .bind(message_id)
                .fetch_one(self.pool())
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM message_recipients")
                .fetch_one(self.pool())
                .await?
        };

        Ok(row.0)
    }

    /// Flip a recipient record from unread to read.
    ///
    /// The flag update is conditional on `is_read = 0`, so concurrent callers
    /// race on a single row transition; only the winner increments the
    /// message's `read_count`, inside the same transaction.
    pub async fn mark_recipient_read(
        &self,
        message_id: &str,
        recipient_id: &str,
        read_at: i64,
    ) -> Result<ReadTransition, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let flipped = sqlx::query(
            "UPDATE message_recipients SET is_read = 1, read_at = ? \
             WHERE message_id = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(read_at)
        .bind(message_id)
        .bind(recipient_id)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 1 {
            let bumped = sqlx::query(
                "UPDATE messages SET read_count = read_count + 1 \
                 WHERE id = ? AND read_count < recipient_count",
            )
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

            if bumped.rows_affected() != 1 {
                // Rolled back on drop.
                return Err(DatabaseError::Query(format!(
                    "read_count for message {message_id} would exceed recipient_count"
                )));
            }

            tx.commit().await?;
            return Ok(ReadTransition::Marked);
        }

        let record_exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM message_recipients WHERE message_id = ? AND recipient_id = ?",
        )
        .bind(message_id)
        .bind(recipient_id)
        .fetch_optional(&mut *tx)
        .await?;

        let transition = if record_exists.is_some() {
            ReadTransition::AlreadyRead
        } else {
            let message_exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM messages WHERE id = ?")
                    .bind(message_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if message_exists.is_some() {
                ReadTransition::MissingRecord
            } else {
                ReadTransition::MissingMessage
            }
        };

        tx.commit().await?;
        Ok(transition)
    }

    /// Stream the messages addressed to a recipient, newest first.
    ///
    /// Rows are pulled from the database as the stream is polled. The stream
    /// holds a pooled connection until it is dropped or exhausted.
    pub fn stream_messages_for_recipient<'a>(
        &'a self,
        recipient_id: &'a str,
    ) -> impl Stream<Item = Result<InboxEntry, DatabaseError>> + Send + 'a {
        sqlx::query_as::<_, InboxEntry>(INBOX_QUERY)
            .bind(recipient_id)
            .fetch(self.pool())
            .map(|row| row.map_err(DatabaseError::from))
    }
}

const INBOX_QUERY: &str = "SELECT m.id, m.farm_id, m.sender_id, m.title, m.body, m.summary, \
     m.media_refs, m.sent_at, m.recipient_count, m.read_count, r.is_read, r.read_at \
     FROM message_recipients r JOIN messages m ON m.id = r.message_id \
     WHERE r.recipient_id = ? ORDER BY m.sent_at DESC, m.rowid DESC";
