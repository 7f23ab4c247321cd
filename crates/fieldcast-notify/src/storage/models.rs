//! Data models for Fieldcast notification storage.

use serde::{Deserialize, Serialize};

/// An authored broadcast.
///
/// Immutable after creation except for `read_count`, which only grows and
/// never exceeds `recipient_count`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub farm_id: String,
    pub sender_id: String,
    pub title: String,
    pub body: String,
    /// Structured summary payload as JSON text.
    pub summary: Option<String>,
    /// JSON array of media references.
    pub media_refs: String,
    pub sent_at: i64,
    pub recipient_count: i64,
    pub read_count: i64,
}

impl Message {
    /// Parsed summary payload. A malformed payload reads as absent.
    pub fn summary_value(&self) -> Option<serde_json::Value> {
        self.summary
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// Attached media references.
    pub fn media(&self) -> Vec<String> {
        serde_json::from_str(&self.media_refs).unwrap_or_default()
    }
}

/// Per-(message, recipient) read tracking row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipientRecord {
    pub id: String,
    pub message_id: String,
    pub recipient_id: String,
    /// The membership that qualified this recipient for the broadcast.
    pub membership_id: String,
    pub is_read: bool,
    pub read_at: Option<i64>,
}

/// A message as seen from one recipient's inbox.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InboxEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: Message,
    pub is_read: bool,
    pub read_at: Option<i64>,
}

/// Delivery log row: one send attempt on one channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLogEntry {
    pub id: String,
    pub channel: String,
    pub recipient_id: String,
    pub broadcast_id: Option<String>,
    pub farm_id: Option<String>,
    pub subject: String,
    pub content: String,
    pub status: String,
    pub priority: String,
    pub external_id: Option<String>,
    pub provider_id: Option<String>,
    pub fallback_used: bool,
    /// Why the preferred channel was skipped, when `fallback_used` is set.
    pub error: Option<String>,
    pub created_at: i64,
}

/// Stored configuration for an external delivery channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChannelProviderRow {
    pub id: String,
    pub channel_type: String,
    pub provider_name: String,
    pub is_active: bool,
    pub priority: i64,
    pub config: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// In-application inbox entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InboxNotification {
    pub id: String,
    pub recipient_id: String,
    pub farm_id: Option<String>,
    pub broadcast_id: Option<String>,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

/// Outcome recorded for a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Written to the in-application inbox.
    Delivered,
    /// Accepted by an external carrier that confirms asynchronously.
    Pending,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [Self; 3] = [Self::Delivered, Self::Pending, Self::Failed];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of in-application inbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxKind {
    /// Written by the dispatch router as the in-application channel.
    Direct,
    /// Badge alert written by the broadcast composer for every recipient.
    Broadcast,
}

impl InboxKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for InboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
