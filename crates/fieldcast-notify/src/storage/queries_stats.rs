//! Aggregate queries backing the statistics service.

use serde::Serialize;

use super::db::{DatabaseError, NotifyDatabase};

/// Aggregates over every message a sender authored.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct SenderTotals {
    pub total_messages: i64,
    pub total_recipients: i64,
    pub total_reads: i64,
    pub distinct_farms: i64,
    pub last_sent_at: Option<i64>,
}

/// System-wide aggregates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemTotals {
    pub total_messages: i64,
    pub total_recipient_records: i64,
    pub total_read_records: i64,
    pub distinct_farms: i64,
    pub distinct_senders: i64,
    pub messages_last_7_days: i64,
    pub messages_last_30_days: i64,
}

/// Delivery log row count for one (channel, status) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ChannelOutcomeCount {
    pub channel: String,
    pub status: String,
    pub count: i64,
}

const DAY_SECS: i64 = 24 * 60 * 60;

impl NotifyDatabase {
    // =========================================================================
    // Statistics queries
    // =========================================================================

    /// Aggregate every message authored by `sender_id`.
    pub async fn sender_totals(&self, sender_id: &str) -> Result<SenderTotals, DatabaseError> {
        let totals = sqlx::query_as::<_, SenderTotals>(
            "SELECT COUNT(*) AS total_messages, \
                    COALESCE(SUM(recipient_count), 0) AS total_recipients, \
                    COALESCE(SUM(read_count), 0) AS total_reads, \
                    COUNT(DISTINCT farm_id) AS distinct_farms, \
                    MAX(sent_at) AS last_sent_at \
             FROM messages WHERE sender_id = ?",
        )
        .bind(sender_id)
        .fetch_one(self.pool())
        .await?;

        Ok(totals)
    }

    /// Aggregate the whole message store relative to `now`.
    pub async fn system_totals(&self, now: i64) -> Result<SystemTotals, DatabaseError> {
        let messages: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(DISTINCT farm_id), \
                    COUNT(DISTINCT sender_id), \
                    COALESCE(SUM(CASE WHEN sent_at >= ? THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN sent_at >= ? THEN 1 ELSE 0 END), 0) \
             FROM messages",
        )
        .bind(now - 7 * DAY_SECS)
        .bind(now - 30 * DAY_SECS)
        .fetch_one(self.pool())
        .await?;

        let records: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_read), 0) FROM message_recipients",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(SystemTotals {
            total_messages: messages.0,
            total_recipient_records: records.0,
            total_read_records: records.1,
            distinct_farms: messages.1,
            distinct_senders: messages.2,
            messages_last_7_days: messages.3,
            messages_last_30_days: messages.4,
        })
    }

    /// Count delivery log rows grouped by channel and status.
    pub async fn delivery_outcome_counts(&self) -> Result<Vec<ChannelOutcomeCount>, DatabaseError> {
        let counts = sqlx::query_as::<_, ChannelOutcomeCount>(
            "SELECT channel, status, COUNT(*) AS count FROM delivery_log \
             GROUP BY channel, status ORDER BY channel ASC, status ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(counts)
    }

    /// Count delivery log rows that carried a fallback.
    pub async fn fallback_delivery_count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_log WHERE fallback_used = 1")
                .fetch_one(self.pool())
                .await?;

        Ok(row.0)
    }
}
