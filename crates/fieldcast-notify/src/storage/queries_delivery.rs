//! Delivery log queries. The table is append-only.

use super::db::{DatabaseError, NotifyDatabase};
use super::models::{DeliveryLogEntry, DeliveryStatus};

/// Parameters for appending a delivery log row.
pub struct NewDeliveryLog<'a> {
    pub id: &'a str,
    pub channel: &'a str,
    pub recipient_id: &'a str,
    pub broadcast_id: Option<&'a str>,
    pub farm_id: Option<&'a str>,
    pub subject: &'a str,
    pub content: &'a str,
    pub status: DeliveryStatus,
    pub priority: &'a str,
    pub external_id: Option<&'a str>,
    pub provider_id: Option<&'a str>,
    pub fallback_used: bool,
    pub error: Option<&'a str>,
    pub created_at: i64,
}

impl NotifyDatabase {
    // =========================================================================
    // Delivery log queries
    // =========================================================================

    /// Append one delivery attempt to the log.
    pub async fn append_delivery_log(
        &self,
        params: &NewDeliveryLog<'_>,
    ) -> Result<DeliveryLogEntry, DatabaseError> {
        sqlx::query(
            "INSERT INTO delivery_log (id, channel, recipient_id, broadcast_id, farm_id, subject, content, \
             status, priority, external_id, provider_id, fallback_used, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.channel)
        .bind(params.recipient_id)
        .bind(params.broadcast_id)
        .bind(params.farm_id)
        .bind(params.subject)
        .bind(params.content)
        .bind(params.status.as_str())
        .bind(params.priority)
        .bind(params.external_id)
        .bind(params.provider_id)
        .bind(params.fallback_used)
        .bind(params.error)
        .bind(params.created_at)
        .execute(self.pool())
        .await?;

        self.get_delivery_log(params.id).await
    }

    /// Get a delivery log row by ID.
    pub async fn get_delivery_log(&self, id: &str) -> Result<DeliveryLogEntry, DatabaseError> {
        sqlx::query_as::<_, DeliveryLogEntry>("SELECT * FROM delivery_log WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Delivery log {id}")))
    }

    /// List delivery log rows, newest first, optionally for one recipient.
    pub async fn list_delivery_log(
        &self,
        recipient_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let entries = if let Some(recipient_id) = recipient_id {
            sqlx::query_as::<_, DeliveryLogEntry>(
                "SELECT * FROM delivery_log WHERE recipient_id = ? \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?",
            )
            .bind(recipient_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, DeliveryLogEntry>(
                "SELECT * FROM delivery_log ORDER BY created_at DESC, rowid DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        };

        Ok(entries)
    }

    /// List every delivery log row written for one broadcast.
    pub async fn list_delivery_log_for_broadcast(
        &self,
        broadcast_id: &str,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, DeliveryLogEntry>(
            "SELECT * FROM delivery_log WHERE broadcast_id = ? ORDER BY rowid ASC",
        )
        .bind(broadcast_id)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }
}
