//! Broadcast composer.
//!
//! Records a broadcast and its recipient records atomically, then notifies
//! every recipient through the dispatch router. Notification runs as a
//! bounded task group; a failing recipient is logged and counted, never
//! propagated.

use std::sync::Arc;

use fieldcast_core::config::DEFAULT_MAX_CONCURRENCY;
use fieldcast_core::{ChannelType, Priority};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use super::audience::{AudienceMember, MembershipProvider, dedupe_audience};
use crate::clock::Clock;
use crate::dispatch::{DispatchRouter, InboxDraft, NotificationPayload};
use crate::error::NotifyError;
use crate::storage::{InboxKind, Message, NewMessage, NewRecipient, NotifyDatabase};

/// Length of the body preview carried by inbox badge alerts.
const ALERT_PREVIEW_CHARS: usize = 140;

/// An administrator-authored broadcast before it is recorded.
#[derive(Debug, Clone, Default)]
pub struct BroadcastDraft {
    pub farm_id: String,
    pub title: String,
    pub body: String,
    /// Structured summary payload (e.g. a payout breakdown).
    pub summary: Option<serde_json::Value>,
    pub media_refs: Vec<String>,
    /// Overrides every recipient's own preference when set.
    pub preferred_channel: Option<ChannelType>,
    pub priority: Priority,
}

impl BroadcastDraft {
    pub fn new(farm_id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            farm_id: farm_id.into(),
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    fn validate(&self, sender_id: &str) -> Result<(), NotifyError> {
        for (field, value) in [
            ("farm_id", self.farm_id.as_str()),
            ("title", self.title.as_str()),
            ("body", self.body.as_str()),
            ("sender_id", sender_id),
        ] {
            if value.trim().is_empty() {
                return Err(NotifyError::InvalidInput(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// How the per-recipient notifications of one broadcast went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    /// Carried by the in-application channel as preferred.
    pub delivered: usize,
    /// Handed to an external carrier.
    pub pending: usize,
    /// Preferred channel failed or was unavailable; inbox carried it.
    pub fallback: usize,
    /// Nothing carried it.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
enum RecipientOutcome {
    Delivered,
    Pending,
    Fallback,
    Failed,
}

impl FanOutSummary {
    const fn record(&mut self, outcome: RecipientOutcome) {
        match outcome {
            RecipientOutcome::Delivered => self.delivered += 1,
            RecipientOutcome::Pending => self.pending += 1,
            RecipientOutcome::Fallback => self.fallback += 1,
            RecipientOutcome::Failed => self.failed += 1,
        }
    }
}

/// Result of a successful broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReceipt {
    pub message_id: String,
    pub recipient_count: usize,
    pub fan_out: FanOutSummary,
}

/// Records broadcasts and fans them out.
pub struct BroadcastComposer {
    db: NotifyDatabase,
    router: Arc<DispatchRouter>,
    membership: Arc<dyn MembershipProvider>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl BroadcastComposer {
    pub fn new(
        db: NotifyDatabase,
        router: Arc<DispatchRouter>,
        membership: Arc<dyn MembershipProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            router,
            membership,
            clock,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Bound on concurrent per-recipient notifications. `0` means default.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = if max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency
        };
        self
    }

    /// Record and fan out a broadcast.
    ///
    /// Returns once every recipient has been attempted. The call fails only
    /// if the broadcast could not be recorded; in that case nothing was
    /// written.
    #[instrument(skip(self, draft), fields(farm_id = %draft.farm_id))]
    pub async fn create_message(
        &self,
        draft: &BroadcastDraft,
        sender_id: &str,
    ) -> Result<BroadcastReceipt, NotifyError> {
        draft.validate(sender_id)?;

        let audience = dedupe_audience(self.membership.qualifying_members(&draft.farm_id).await?);
        if audience.is_empty() {
            return Err(NotifyError::EmptyAudience {
                farm_id: draft.farm_id.clone(),
            });
        }

        let summary = draft
            .summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| NotifyError::InvalidInput(format!("summary: {e}")))?;
        let media_refs = serde_json::to_string(&draft.media_refs)
            .map_err(|e| NotifyError::InvalidInput(format!("media_refs: {e}")))?;

        let message_id = uuid::Uuid::new_v4().to_string();
        let recipients: Vec<NewRecipient> = audience
            .iter()
            .map(|m| NewRecipient {
                id: uuid::Uuid::new_v4().to_string(),
                recipient_id: m.recipient_id.clone(),
                membership_id: m.membership_id.clone(),
            })
            .collect();

        let message = self
            .db
            .create_message_with_recipients(
                &NewMessage {
                    id: &message_id,
                    farm_id: &draft.farm_id,
                    sender_id,
                    title: &draft.title,
                    body: &draft.body,
                    summary: summary.as_deref(),
                    media_refs: &media_refs,
                    sent_at: self.clock.now(),
                },
                &recipients,
            )
            .await?;

        info!(
            message_id = %message.id,
            recipient_count = message.recipient_count,
            "Broadcast recorded"
        );

        let fan_out = self.fan_out(&message, audience, draft).await;

        info!(
            message_id = %message.id,
            delivered = fan_out.delivered,
            pending = fan_out.pending,
            fallback = fan_out.fallback,
            failed = fan_out.failed,
            "Broadcast fan-out complete"
        );

        Ok(BroadcastReceipt {
            recipient_count: recipients.len(),
            message_id,
            fan_out,
        })
    }

    async fn fan_out(
        &self,
        message: &Message,
        audience: Vec<AudienceMember>,
        draft: &BroadcastDraft,
    ) -> FanOutSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for member in audience {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                warn!(message_id = %message.id, "Fan-out semaphore closed");
                break;
            };

            let payload = NotificationPayload {
                recipient_id: member.recipient_id,
                contact: member.contact,
                subject: message.title.clone(),
                body: message.body.clone(),
                priority: draft.priority,
                preferred_channel: draft.preferred_channel.or(member.preferred_channel),
                farm_id: Some(message.farm_id.clone()),
                broadcast_id: Some(message.id.clone()),
            };
            let router = Arc::clone(&self.router);
            let clock = Arc::clone(&self.clock);

            tasks.spawn(async move {
                let _permit = permit;
                notify_recipient(&router, clock.as_ref(), &payload).await
            });
        }

        let mut summary = FanOutSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Fan-out task aborted");
                    summary.record(RecipientOutcome::Failed);
                }
            }
        }
        summary
    }
}

/// Send one recipient's notification and drop a badge alert in their inbox.
async fn notify_recipient(
    router: &DispatchRouter,
    clock: &dyn Clock,
    payload: &NotificationPayload,
) -> RecipientOutcome {
    let outcome = match router.send(payload).await {
        Ok(result) if result.fallback_used => RecipientOutcome::Fallback,
        Ok(result) if result.channel_used.is_external() => RecipientOutcome::Pending,
        Ok(_) => RecipientOutcome::Delivered,
        Err(e) => {
            warn!(
                recipient_id = %payload.recipient_id,
                error = %e,
                "Broadcast notification failed"
            );
            RecipientOutcome::Failed
        }
    };

    let preview: String = payload.body.chars().take(ALERT_PREVIEW_CHARS).collect();
    let alert = router
        .inbox()
        .create_inbox_message(InboxDraft {
            recipient_id: &payload.recipient_id,
            subject: &payload.subject,
            body: &preview,
            farm_id: payload.farm_id.as_deref(),
            broadcast_id: payload.broadcast_id.as_deref(),
            kind: InboxKind::Broadcast,
            priority: payload.priority,
            created_at: clock.now(),
        })
        .await;
    if let Err(e) = alert {
        warn!(
            recipient_id = %payload.recipient_id,
            error = %e,
            "Broadcast alert could not be written"
        );
    }

    outcome
}
