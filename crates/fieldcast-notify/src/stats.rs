//! Statistics aggregation.
//!
//! Every view is recomputed from storage on each call. Rates are whole
//! percentages rounded half up, and 0 whenever the denominator is 0.

use std::collections::BTreeMap;
use std::sync::Arc;

use fieldcast_core::ChannelType;
use serde::Serialize;

use crate::clock::Clock;
use crate::error::NotifyError;
use crate::storage::{DeliveryStatus, Message, NotifyDatabase};

/// `round(part / whole * 100)`, or 0 when `whole` is not positive.
pub fn percentage(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return 0;
    }
    let part = part.clamp(0, whole);
    (part * 200 + whole) / (whole * 2)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub message_id: String,
    pub farm_id: String,
    pub recipient_count: i64,
    pub read_count: i64,
    pub unread_count: i64,
    pub read_rate: i64,
}

impl From<&Message> for MessageStats {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            farm_id: message.farm_id.clone(),
            recipient_count: message.recipient_count,
            read_count: message.read_count,
            unread_count: (message.recipient_count - message.read_count).max(0),
            read_rate: percentage(message.read_count, message.recipient_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    pub sender_id: String,
    pub total_messages: i64,
    pub total_recipients: i64,
    pub total_reads: i64,
    pub read_rate: i64,
    pub last_sent_at: Option<i64>,
    /// Distinct farms this sender has broadcast to.
    pub farms_assigned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub total_messages: i64,
    pub total_recipient_records: i64,
    pub total_read_records: i64,
    pub distinct_farms: i64,
    pub distinct_senders: i64,
    /// `sum(read) / sum(recipients)` over every recipient record.
    pub average_read_rate: i64,
    pub messages_last_7_days: i64,
    pub messages_last_30_days: i64,
    pub computed_at: i64,
}

/// Delivery outcomes for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelDeliveryStats {
    pub delivered: i64,
    pub pending: i64,
    pub failed: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub channels: BTreeMap<ChannelType, ChannelDeliveryStats>,
    pub total_attempts: i64,
    pub fallback_count: i64,
    pub fallback_rate: i64,
}

/// Computes message, sender, system and delivery statistics.
#[derive(Clone)]
pub struct StatsAggregator {
    db: NotifyDatabase,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(db: NotifyDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn message_stats(&self, message_id: &str) -> Result<MessageStats, NotifyError> {
        let message = self
            .db
            .find_message(message_id)
            .await?
            .ok_or_else(|| NotifyError::UnknownMessage(message_id.to_string()))?;
        Ok(MessageStats::from(&message))
    }

    /// A sender with no messages gets all-zero stats.
    pub async fn sender_stats(&self, sender_id: &str) -> Result<SenderStats, NotifyError> {
        let totals = self.db.sender_totals(sender_id).await?;
        Ok(SenderStats {
            sender_id: sender_id.to_string(),
            total_messages: totals.total_messages,
            total_recipients: totals.total_recipients,
            total_reads: totals.total_reads,
            read_rate: percentage(totals.total_reads, totals.total_recipients),
            last_sent_at: totals.last_sent_at,
            farms_assigned: totals.distinct_farms,
        })
    }

    pub async fn system_stats(&self) -> Result<SystemStats, NotifyError> {
        let now = self.clock.now();
        let totals = self.db.system_totals(now).await?;
        Ok(SystemStats {
            total_messages: totals.total_messages,
            total_recipient_records: totals.total_recipient_records,
            total_read_records: totals.total_read_records,
            distinct_farms: totals.distinct_farms,
            distinct_senders: totals.distinct_senders,
            average_read_rate: percentage(
                totals.total_read_records,
                totals.total_recipient_records,
            ),
            messages_last_7_days: totals.messages_last_7_days,
            messages_last_30_days: totals.messages_last_30_days,
            computed_at: now,
        })
    }

    /// Per-channel outcome counts and the fallback rate from the delivery log.
    pub async fn delivery_stats(&self) -> Result<DeliveryStats, NotifyError> {
        let mut channels: BTreeMap<ChannelType, ChannelDeliveryStats> = ChannelType::ALL
            .into_iter()
            .map(|c| (c, ChannelDeliveryStats::default()))
            .collect();

        for row in self.db.delivery_outcome_counts().await? {
            let channel: ChannelType = row.channel.parse()?;
            let entry = channels.entry(channel).or_default();
            match DeliveryStatus::parse(&row.status) {
                Some(DeliveryStatus::Delivered) => entry.delivered += row.count,
                Some(DeliveryStatus::Pending) => entry.pending += row.count,
                Some(DeliveryStatus::Failed) | None => entry.failed += row.count,
            }
            entry.total += row.count;
        }

        let total_attempts = channels.values().map(|c| c.total).sum();
        let fallback_count = self.db.fallback_delivery_count().await?;

        Ok(DeliveryStats {
            channels,
            total_attempts,
            fallback_count,
            fallback_rate: percentage(fallback_count, total_attempts),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(recipients: i64, reads: i64) -> Message {
        Message {
            id: "m1".into(),
            farm_id: "farm-1".into(),
            sender_id: "admin-1".into(),
            title: "t".into(),
            body: "b".into(),
            summary: None,
            media_refs: "[]".into(),
            sent_at: 0,
            recipient_count: recipients,
            read_count: reads,
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(0, 5), 0);
    }

    #[test]
    fn percentage_guards_zero_denominator() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
        assert_eq!(percentage(1, -1), 0);
    }

    #[test]
    fn read_rate_of_empty_message_is_zero() {
        let stats = MessageStats::from(&message(0, 0));
        assert_eq!(stats.read_rate, 0);
        assert_eq!(stats.unread_count, 0);
    }

    #[test]
    fn message_stats_derive_unread() {
        let stats = MessageStats::from(&message(4, 1));
        assert_eq!(stats.unread_count, 3);
        assert_eq!(stats.read_rate, 25);
    }

    #[tokio::test]
    async fn empty_store_has_zero_rates() {
        let db = NotifyDatabase::open_in_memory().await.unwrap();
        let stats = StatsAggregator::new(db, Arc::new(crate::clock::FixedClock::new(1)));

        let system = stats.system_stats().await.unwrap();
        assert_eq!(system.total_messages, 0);
        assert_eq!(system.average_read_rate, 0);

        let delivery = stats.delivery_stats().await.unwrap();
        assert_eq!(delivery.total_attempts, 0);
        assert_eq!(delivery.fallback_rate, 0);
        assert_eq!(delivery.channels.len(), 3);

        let sender = stats.sender_stats("nobody").await.unwrap();
        assert_eq!(sender.total_messages, 0);
        assert_eq!(sender.read_rate, 0);

        assert!(matches!(
            stats.message_stats("ghost").await,
            Err(NotifyError::UnknownMessage(_))
        ));
    }
}
