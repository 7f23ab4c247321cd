//! `NotificationEngine`: the programmatic surface of the notification core.
//!
//! Wires storage, registry, router, composer, receipt tracker and stats
//! aggregator around one database handle, one clock and one membership
//! provider.

use std::sync::Arc;

use fieldcast_core::ChannelType;
use fieldcast_core::config::DispatchConfig;
use tokio_stream::Stream;
use tracing::instrument;

use crate::broadcast::{BroadcastComposer, BroadcastDraft, BroadcastReceipt, MembershipProvider};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{CarrierAdapter, DispatchRouter, InboxWriter, NotificationPayload, SendResult};
use crate::error::NotifyError;
use crate::receipts::ReadReceiptTracker;
use crate::registry::{ChannelProvider, ChannelStatus, ProviderConfig, ProviderRegistry};
use crate::stats::{DeliveryStats, MessageStats, SenderStats, StatsAggregator, SystemStats};
use crate::storage::{DeliveryLogEntry, InboxEntry, InboxNotification, Message, NotifyDatabase};

/// Builder for [`NotificationEngine`].
pub struct EngineBuilder {
    db: NotifyDatabase,
    membership: Arc<dyn MembershipProvider>,
    clock: Arc<dyn Clock>,
    inbox: Option<Arc<dyn InboxWriter>>,
    carriers: Vec<(ChannelType, Arc<dyn CarrierAdapter>)>,
    dispatch: DispatchConfig,
}

impl EngineBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn carrier(mut self, channel: ChannelType, carrier: Arc<dyn CarrierAdapter>) -> Self {
        self.carriers.push((channel, carrier));
        self
    }

    /// Replace the database-backed inbox.
    #[must_use]
    pub fn inbox(mut self, inbox: Arc<dyn InboxWriter>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    #[must_use]
    pub fn dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn build(self) -> NotificationEngine {
        let mut router = DispatchRouter::new(self.db.clone(), Arc::clone(&self.clock))
            .with_carrier_timeout(self.dispatch.effective_carrier_timeout())
            .with_default_channel(self.dispatch.default_channel);
        if let Some(inbox) = self.inbox {
            router = router.with_inbox(inbox);
        }
        for (channel, carrier) in self.carriers {
            router = router.with_carrier(channel, carrier);
        }
        let router = Arc::new(router);

        let composer = BroadcastComposer::new(
            self.db.clone(),
            Arc::clone(&router),
            self.membership,
            Arc::clone(&self.clock),
        )
        .with_max_concurrency(self.dispatch.effective_concurrency());

        NotificationEngine {
            registry: router.registry().clone(),
            receipts: ReadReceiptTracker::new(self.db.clone(), Arc::clone(&self.clock)),
            stats: StatsAggregator::new(self.db.clone(), Arc::clone(&self.clock)),
            clock: self.clock,
            db: self.db,
            router,
            composer,
        }
    }
}

/// The notification dispatch and broadcast engine.
pub struct NotificationEngine {
    db: NotifyDatabase,
    clock: Arc<dyn Clock>,
    registry: ProviderRegistry,
    router: Arc<DispatchRouter>,
    composer: BroadcastComposer,
    receipts: ReadReceiptTracker,
    stats: StatsAggregator,
}

impl NotificationEngine {
    /// Start building an engine on `db`, resolving audiences via `membership`.
    pub fn builder(db: NotifyDatabase, membership: Arc<dyn MembershipProvider>) -> EngineBuilder {
        EngineBuilder {
            db,
            membership,
            clock: Arc::new(SystemClock),
            inbox: None,
            carriers: Vec::new(),
            dispatch: DispatchConfig::default(),
        }
    }

    pub const fn database(&self) -> &NotifyDatabase {
        &self.db
    }

    // =========================================================================
    // Broadcasts and dispatch
    // =========================================================================

    /// Broadcast to every qualifying member of a farm. Returns the message ID.
    pub async fn create_broadcast(
        &self,
        farm_id: &str,
        title: &str,
        body: &str,
        sender_id: &str,
        preferred_channel: Option<ChannelType>,
    ) -> Result<String, NotifyError> {
        let mut draft = BroadcastDraft::new(farm_id, title, body);
        draft.preferred_channel = preferred_channel;
        Ok(self.broadcast(&draft, sender_id).await?.message_id)
    }

    /// Broadcast a full draft and report the fan-out.
    pub async fn broadcast(
        &self,
        draft: &BroadcastDraft,
        sender_id: &str,
    ) -> Result<BroadcastReceipt, NotifyError> {
        self.composer.create_message(draft, sender_id).await
    }

    /// Send one notification outside of any broadcast.
    #[instrument(skip(self, payload), fields(recipient_id = %payload.recipient_id))]
    pub async fn send(&self, payload: &NotificationPayload) -> Result<SendResult, NotifyError> {
        self.router.send(payload).await
    }

    // =========================================================================
    // Messages and read receipts
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn mark_read(&self, message_id: &str, recipient_id: &str) -> Result<(), NotifyError> {
        self.receipts.mark_read(message_id, recipient_id).await
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message, NotifyError> {
        self.db
            .find_message(message_id)
            .await?
            .ok_or_else(|| NotifyError::UnknownMessage(message_id.to_string()))
    }

    /// Messages sent to a farm, newest first.
    pub async fn get_messages_for_farm(&self, farm_id: &str) -> Result<Vec<Message>, NotifyError> {
        Ok(self.db.list_messages_for_farm(farm_id).await?)
    }

    /// Messages authored by a sender, newest first.
    pub async fn get_messages_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Vec<Message>, NotifyError> {
        Ok(self.db.list_messages_by_sender(sender_id).await?)
    }

    /// Lazy, newest-first stream of a recipient's messages with read state.
    pub fn get_messages_for_recipient<'a>(
        &'a self,
        recipient_id: &'a str,
    ) -> impl Stream<Item = Result<InboxEntry, NotifyError>> + Send + 'a {
        self.receipts.messages_for_recipient(recipient_id)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub async fn get_message_stats(&self, message_id: &str) -> Result<MessageStats, NotifyError> {
        self.stats.message_stats(message_id).await
    }

    pub async fn get_sender_stats(&self, sender_id: &str) -> Result<SenderStats, NotifyError> {
        self.stats.sender_stats(sender_id).await
    }

    pub async fn get_system_stats(&self) -> Result<SystemStats, NotifyError> {
        self.stats.system_stats().await
    }

    pub async fn get_delivery_stats(&self) -> Result<DeliveryStats, NotifyError> {
        self.stats.delivery_stats().await
    }

    /// Delivery log rows, newest first.
    pub async fn list_delivery_log(
        &self,
        recipient_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeliveryLogEntry>, NotifyError> {
        Ok(self.db.list_delivery_log(recipient_id, limit).await?)
    }

    // =========================================================================
    // Channels and providers
    // =========================================================================

    pub async fn get_channel_status(&self) -> Result<Vec<ChannelStatus>, NotifyError> {
        Ok(self.registry.channel_status().await?)
    }

    pub async fn register_provider(
        &self,
        id: &str,
        provider_name: &str,
        priority: i64,
        config: &ProviderConfig,
    ) -> Result<ChannelProvider, NotifyError> {
        Ok(self
            .registry
            .register_provider(id, provider_name, priority, config)
            .await?)
    }

    pub async fn set_provider_active(&self, id: &str, active: bool) -> Result<(), NotifyError> {
        Ok(self.registry.set_provider_active(id, active).await?)
    }

    pub async fn list_providers(&self) -> Result<Vec<ChannelProvider>, NotifyError> {
        Ok(self.registry.list_providers().await?)
    }

    // =========================================================================
    // Inbox
    // =========================================================================

    pub async fn list_inbox(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<InboxNotification>, NotifyError> {
        Ok(self.db.list_inbox(recipient_id, unread_only).await?)
    }

    pub async fn unread_inbox_count(&self, recipient_id: &str) -> Result<i64, NotifyError> {
        Ok(self.db.unread_inbox_count(recipient_id).await?)
    }

    /// Mark an inbox entry read. Returns `false` if it already was.
    pub async fn mark_inbox_read(&self, notification_id: &str) -> Result<bool, NotifyError> {
        Ok(self
            .db
            .mark_inbox_read(notification_id, self.clock.now())
            .await?)
    }
}
