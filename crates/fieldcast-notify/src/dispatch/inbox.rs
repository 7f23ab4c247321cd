//! The in-application inbox, seen as a delivery channel.

use async_trait::async_trait;
use fieldcast_core::Priority;

use crate::storage::{DatabaseError, InboxKind, NewInboxNotification, NotifyDatabase};

/// One inbox write.
#[derive(Debug, Clone, Copy)]
pub struct InboxDraft<'a> {
    pub recipient_id: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub farm_id: Option<&'a str>,
    pub broadcast_id: Option<&'a str>,
    pub kind: InboxKind,
    pub priority: Priority,
    pub created_at: i64,
}

/// Writes entries into a recipient's in-application inbox.
#[async_trait]
pub trait InboxWriter: Send + Sync {
    /// Returns the ID of the new inbox entry.
    async fn create_inbox_message(&self, draft: InboxDraft<'_>) -> Result<String, DatabaseError>;
}

#[async_trait]
impl InboxWriter for NotifyDatabase {
    async fn create_inbox_message(&self, draft: InboxDraft<'_>) -> Result<String, DatabaseError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.create_inbox_notification(&NewInboxNotification {
            id: &id,
            recipient_id: draft.recipient_id,
            farm_id: draft.farm_id,
            broadcast_id: draft.broadcast_id,
            kind: draft.kind,
            subject: draft.subject,
            body: draft.body,
            priority: draft.priority.as_str(),
            created_at: draft.created_at,
        })
        .await?;
        Ok(id)
    }
}
