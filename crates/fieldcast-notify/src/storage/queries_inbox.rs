//! In-application inbox queries.

use super::db::{DatabaseError, NotifyDatabase};
use super::models::{InboxKind, InboxNotification};

/// Parameters for writing an inbox notification.
pub struct NewInboxNotification<'a> {
    pub id: &'a str,
    pub recipient_id: &'a str,
    pub farm_id: Option<&'a str>,
    pub broadcast_id: Option<&'a str>,
    pub kind: InboxKind,
    pub subject: &'a str,
    pub body: &'a str,
    pub priority: &'a str,
    pub created_at: i64,
}

impl NotifyDatabase {
    // =========================================================================
    // Inbox queries
    // =========================================================================

    /// Write an unread inbox notification.
    pub async fn create_inbox_notification(
        &self,
        params: &NewInboxNotification<'_>,
    ) -> Result<InboxNotification, DatabaseError> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, farm_id, broadcast_id, kind, subject, body, \
             priority, is_read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(params.id)
        .bind(params.recipient_id)
        .bind(params.farm_id)
        .bind(params.broadcast_id)
        .bind(params.kind.as_str())
        .bind(params.subject)
        .bind(params.body)
        .bind(params.priority)
        .bind(params.created_at)
        .execute(self.pool())
        .await?;

        self.get_inbox_notification(params.id).await
    }

    /// Get an inbox notification by ID.
    pub async fn get_inbox_notification(
        &self,
        id: &str,
    ) -> Result<InboxNotification, DatabaseError> {
        sqlx::query_as::<_, InboxNotification>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Notification {id}")))
    }

    /// List a recipient's inbox, newest first.
    pub async fn list_inbox(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<InboxNotification>, DatabaseError> {
        let query = if unread_only {
            "SELECT * FROM notifications WHERE recipient_id = ? AND is_read = 0 \
             ORDER BY created_at DESC, rowid DESC"
        } else {
            "SELECT * FROM notifications WHERE recipient_id = ? \
             ORDER BY created_at DESC, rowid DESC"
        };

        let notifications = sqlx::query_as::<_, InboxNotification>(query)
            .bind(recipient_id)
            .fetch_all(self.pool())
            .await?;

        Ok(notifications)
    }

    /// Count unread inbox notifications for a recipient.
    pub async fn unread_inbox_count(&self, recipient_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Mark an inbox notification read.
    ///
    /// Returns `true` if the notification flipped, `false` if it was already
    /// read. A missing notification is `NotFound`.
    pub async fn mark_inbox_read(&self, id: &str, read_at: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(read_at)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        self.get_inbox_notification(id).await?;
        Ok(false)
    }
}
