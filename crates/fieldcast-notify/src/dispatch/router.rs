//! Dispatch router.
//!
//! Chooses the channel that carries one notification. An external channel
//! is tried once, on its highest-priority active provider; anything short of
//! an accepted send falls back to the in-application inbox. Exactly one
//! delivery log row is written per send: the one for the carrying channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fieldcast_core::config::DEFAULT_CARRIER_TIMEOUT_SECS;
use fieldcast_core::{ChannelType, Priority};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::carrier::CarrierAdapter;
use super::inbox::{InboxDraft, InboxWriter};
use super::CarrierError;
use crate::clock::Clock;
use crate::error::NotifyError;
use crate::registry::ProviderRegistry;
use crate::storage::{DeliveryStatus, InboxKind, NewDeliveryLog, NotifyDatabase};

/// One outbound notification.
#[derive(Debug, Clone, Default)]
pub struct NotificationPayload {
    pub recipient_id: String,
    /// Phone number or chat handle for external channels.
    pub contact: Option<String>,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    /// `None` uses the router's default channel.
    pub preferred_channel: Option<ChannelType>,
    pub farm_id: Option<String>,
    /// Set when the notification belongs to a broadcast.
    pub broadcast_id: Option<String>,
}

/// Outcome of [`DispatchRouter::send`].
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub channel_used: ChannelType,
    /// Inbox entry ID when the in-application channel carried the message.
    pub message_id: Option<String>,
    /// Carrier-assigned ID when an external channel carried the message.
    pub external_id: Option<String>,
    /// Why the preferred channel was not used.
    pub error: Option<String>,
    pub fallback_used: bool,
    pub delivery_log_id: String,
}

struct ExternalDelivery {
    provider_id: String,
    external_id: Option<String>,
}

/// Routes notifications to a channel, with fallback to the inbox.
pub struct DispatchRouter {
    db: NotifyDatabase,
    registry: ProviderRegistry,
    inbox: Arc<dyn InboxWriter>,
    carriers: HashMap<ChannelType, Arc<dyn CarrierAdapter>>,
    clock: Arc<dyn Clock>,
    carrier_timeout: Duration,
    default_channel: ChannelType,
}

impl DispatchRouter {
    /// Router writing its inbox entries to `db`, with no carriers attached.
    pub fn new(db: NotifyDatabase, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: ProviderRegistry::new(db.clone(), Arc::clone(&clock)),
            inbox: Arc::new(db.clone()),
            db,
            carriers: HashMap::new(),
            clock,
            carrier_timeout: Duration::from_secs(DEFAULT_CARRIER_TIMEOUT_SECS),
            default_channel: ChannelType::Internal,
        }
    }

    /// Attach the transport for an external channel.
    #[must_use]
    pub fn with_carrier(mut self, channel: ChannelType, carrier: Arc<dyn CarrierAdapter>) -> Self {
        if channel.is_external() {
            self.carriers.insert(channel, carrier);
        }
        self
    }

    #[must_use]
    pub fn with_inbox(mut self, inbox: Arc<dyn InboxWriter>) -> Self {
        self.inbox = inbox;
        self
    }

    /// Bound each external attempt. A zero timeout keeps the default.
    #[must_use]
    pub const fn with_carrier_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.carrier_timeout = timeout;
        }
        self
    }

    #[must_use]
    pub const fn with_default_channel(mut self, channel: ChannelType) -> Self {
        self.default_channel = channel;
        self
    }

    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn inbox(&self) -> Arc<dyn InboxWriter> {
        Arc::clone(&self.inbox)
    }

    /// Deliver one notification.
    ///
    /// Carrier failures never surface as errors; they show up as
    /// `fallback_used` with the reason in `error`. Errors are reserved for a
    /// failing inbox (the last tier) and for delivery log writes.
    pub async fn send(&self, payload: &NotificationPayload) -> Result<SendResult, NotifyError> {
        let preferred = payload.preferred_channel.unwrap_or(self.default_channel);

        let reason = match preferred {
            ChannelType::Internal => {
                return self.deliver_internal(payload, None).await;
            }
            ChannelType::Sms | ChannelType::WhatsAppBusiness => {
                match self.try_external(preferred, payload).await {
                    Ok(delivery) => return self.record_external(preferred, payload, delivery).await,
                    Err(reason) => reason,
                }
            }
        };

        info!(
            recipient_id = %payload.recipient_id,
            channel = %preferred,
            reason = %reason,
            "Falling back to in-application delivery"
        );
        self.deliver_internal(payload, Some(reason)).await
    }

    /// Attempt an external channel. `Err` carries the fallback reason.
    async fn try_external(
        &self,
        channel: ChannelType,
        payload: &NotificationPayload,
    ) -> Result<ExternalDelivery, String> {
        match self.registry.is_channel_available(channel).await {
            Ok(true) => {}
            Ok(false) => return Err(format!("no active {channel} provider")),
            Err(e) => return Err(format!("provider registry unavailable: {e}")),
        }

        let provider = match self.registry.provider_for(channel).await {
            Ok(Some(provider)) => provider,
            Ok(None) => return Err(format!("no active {channel} provider")),
            Err(e) => return Err(format!("provider registry unavailable: {e}")),
        };

        let carrier = self
            .carriers
            .get(&channel)
            .ok_or_else(|| format!("no carrier adapter for {channel}"))?;

        let attempt = carrier.attempt_send(
            &provider,
            payload.contact.as_deref(),
            &payload.subject,
            &payload.body,
        );
        let receipt = match tokio::time::timeout(self.carrier_timeout, attempt).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(provider_id = %provider.id, error = %e, "Carrier attempt failed");
                return Err(e.to_string());
            }
            Err(_) => {
                let e = CarrierError::Timeout(self.carrier_timeout);
                warn!(provider_id = %provider.id, error = %e, "Carrier attempt timed out");
                return Err(e.to_string());
            }
        };

        if !receipt.accepted {
            return Err(format!("carrier {} declined the message", provider.provider_name));
        }

        Ok(ExternalDelivery {
            provider_id: provider.id,
            external_id: receipt.external_id,
        })
    }

    async fn record_external(
        &self,
        channel: ChannelType,
        payload: &NotificationPayload,
        delivery: ExternalDelivery,
    ) -> Result<SendResult, NotifyError> {
        let log_id = uuid::Uuid::new_v4().to_string();
        self.db
            .append_delivery_log(&NewDeliveryLog {
                id: &log_id,
                channel: channel.as_str(),
                recipient_id: &payload.recipient_id,
                broadcast_id: payload.broadcast_id.as_deref(),
                farm_id: payload.farm_id.as_deref(),
                subject: &payload.subject,
                content: &payload.body,
                status: DeliveryStatus::Pending,
                priority: payload.priority.as_str(),
                external_id: delivery.external_id.as_deref(),
                provider_id: Some(&delivery.provider_id),
                fallback_used: false,
                error: None,
                created_at: self.clock.now(),
            })
            .await?;

        debug!(
            recipient_id = %payload.recipient_id,
            channel = %channel,
            provider_id = %delivery.provider_id,
            "Notification handed to carrier"
        );

        Ok(SendResult {
            success: true,
            channel_used: channel,
            message_id: None,
            external_id: delivery.external_id,
            error: None,
            fallback_used: false,
            delivery_log_id: log_id,
        })
    }

    /// Write to the inbox and log it. `fallback_reason` marks a fallback.
    async fn deliver_internal(
        &self,
        payload: &NotificationPayload,
        fallback_reason: Option<String>,
    ) -> Result<SendResult, NotifyError> {
        let now = self.clock.now();
        let inbox_id = self
            .inbox
            .create_inbox_message(InboxDraft {
                recipient_id: &payload.recipient_id,
                subject: &payload.subject,
                body: &payload.body,
                farm_id: payload.farm_id.as_deref(),
                broadcast_id: payload.broadcast_id.as_deref(),
                kind: InboxKind::Direct,
                priority: payload.priority,
                created_at: now,
            })
            .await
            .map_err(|e| NotifyError::Inbox(e.to_string()))?;

        let fallback_used = fallback_reason.is_some();
        let log_id = uuid::Uuid::new_v4().to_string();
        self.db
            .append_delivery_log(&NewDeliveryLog {
                id: &log_id,
                channel: ChannelType::Internal.as_str(),
                recipient_id: &payload.recipient_id,
                broadcast_id: payload.broadcast_id.as_deref(),
                farm_id: payload.farm_id.as_deref(),
                subject: &payload.subject,
                content: &payload.body,
                status: DeliveryStatus::Delivered,
                priority: payload.priority.as_str(),
                external_id: None,
                provider_id: None,
                fallback_used,
                error: fallback_reason.as_deref(),
                created_at: now,
            })
            .await?;

        Ok(SendResult {
            success: true,
            channel_used: ChannelType::Internal,
            message_id: Some(inbox_id),
            external_id: None,
            error: fallback_reason,
            fallback_used,
            delivery_log_id: log_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::clock::FixedClock;
    use crate::dispatch::CarrierReceipt;
    use crate::registry::{ChannelProvider, ProviderConfig, SmsConfig};
    use crate::storage::DatabaseError;

    enum Behaviour {
        Accept,
        AcceptAfter(Duration),
        Decline,
        Fail,
        Hang,
    }

    struct ScriptedCarrier {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedCarrier {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CarrierAdapter for ScriptedCarrier {
        async fn attempt_send(
            &self,
            _provider: &ChannelProvider,
            _contact: Option<&str>,
            _subject: &str,
            _body: &str,
        ) -> Result<CarrierReceipt, CarrierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Accept => Ok(CarrierReceipt {
                    accepted: true,
                    external_id: Some("ext-1".into()),
                }),
                Behaviour::AcceptAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(CarrierReceipt {
                        accepted: true,
                        external_id: Some("ext-1".into()),
                    })
                }
                Behaviour::Decline => Ok(CarrierReceipt {
                    accepted: false,
                    external_id: None,
                }),
                Behaviour::Fail => Err(CarrierError::Request("connection reset".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    struct BrokenInbox;

    #[async_trait]
    impl InboxWriter for BrokenInbox {
        async fn create_inbox_message(
            &self,
            _draft: InboxDraft<'_>,
        ) -> Result<String, DatabaseError> {
            Err(DatabaseError::Query("database is locked".into()))
        }
    }

    async fn setup(with_sms_provider: bool) -> (NotifyDatabase, DispatchRouter) {
        let db = NotifyDatabase::open_in_memory().await.unwrap();
        let router = DispatchRouter::new(db.clone(), Arc::new(FixedClock::new(1_000)));
        if with_sms_provider {
            router
                .registry()
                .register_provider(
                    "sms-1",
                    "Acme SMS",
                    1,
                    &ProviderConfig::Sms(SmsConfig {
                        api_url: "https://sms.example.com".into(),
                        sender_id: "FIELDCAST".into(),
                        auth_token: "t".into(),
                    }),
                )
                .await
                .unwrap();
        }
        (db, router)
    }

    fn payload(channel: Option<ChannelType>) -> NotificationPayload {
        NotificationPayload {
            recipient_id: "u1".into(),
            contact: Some("+254700000001".into()),
            subject: "Payout".into(),
            body: "Your payout is ready.".into(),
            preferred_channel: channel,
            farm_id: Some("farm-1".into()),
            ..NotificationPayload::default()
        }
    }

    #[tokio::test]
    async fn internal_delivery_is_logged_as_delivered() {
        let (db, router) = setup(false).await;
        let result = router.send(&payload(None)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.channel_used, ChannelType::Internal);
        assert!(!result.fallback_used);
        assert!(result.message_id.is_some());

        let log = db.get_delivery_log(&result.delivery_log_id).await.unwrap();
        assert_eq!(log.channel, "internal");
        assert_eq!(log.status, "delivered");
        assert_eq!(db.unread_inbox_count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn accepted_external_send_is_pending() {
        let (db, router) = setup(true).await;
        let carrier = ScriptedCarrier::new(Behaviour::Accept);
        let router = router.with_carrier(ChannelType::Sms, carrier.clone());

        let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();

        assert_eq!(result.channel_used, ChannelType::Sms);
        assert_eq!(result.external_id.as_deref(), Some("ext-1"));
        assert!(!result.fallback_used);
        assert_eq!(carrier.calls.load(Ordering::SeqCst), 1);

        let log = db.get_delivery_log(&result.delivery_log_id).await.unwrap();
        assert_eq!(log.status, "pending");
        assert_eq!(log.provider_id.as_deref(), Some("sms-1"));
        assert_eq!(db.unread_inbox_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_timeout_keeps_default_bound() {
        let (_db, router) = setup(true).await;
        let router = router
            .with_carrier(
                ChannelType::Sms,
                ScriptedCarrier::new(Behaviour::AcceptAfter(Duration::from_millis(20))),
            )
            .with_carrier_timeout(Duration::ZERO);

        let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();

        assert_eq!(result.channel_used, ChannelType::Sms);
        assert!(!result.fallback_used);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn unavailable_channel_falls_back_without_calling_carrier() {
        let (db, router) = setup(false).await;
        let carrier = ScriptedCarrier::new(Behaviour::Accept);
        let router = router.with_carrier(ChannelType::Sms, carrier.clone());

        let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();

        assert_eq!(result.channel_used, ChannelType::Internal);
        assert!(result.fallback_used);
        assert!(result.error.unwrap().contains("no active sms provider"));
        assert_eq!(carrier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.list_delivery_log(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_and_declined_sends_fall_back() {
        for behaviour in [Behaviour::Fail, Behaviour::Decline] {
            let (db, router) = setup(true).await;
            let router = router.with_carrier(ChannelType::Sms, ScriptedCarrier::new(behaviour));

            let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();
            assert_eq!(result.channel_used, ChannelType::Internal);
            assert!(result.fallback_used);

            let log = db.get_delivery_log(&result.delivery_log_id).await.unwrap();
            assert!(log.fallback_used);
            assert_eq!(log.status, "delivered");
            assert!(log.error.is_some());
        }
    }

    #[tokio::test]
    async fn missing_adapter_falls_back() {
        let (_db, router) = setup(true).await;
        let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();
        assert!(result.fallback_used);
        assert!(result.error.unwrap().contains("no carrier adapter"));
    }

    #[tokio::test]
    async fn slow_carrier_times_out_into_fallback() {
        let (_db, router) = setup(true).await;
        let router = router
            .with_carrier(ChannelType::Sms, ScriptedCarrier::new(Behaviour::Hang))
            .with_carrier_timeout(Duration::from_millis(50));

        let result = router.send(&payload(Some(ChannelType::Sms))).await.unwrap();
        assert!(result.fallback_used);
        assert!(result.error.unwrap().contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn broken_inbox_is_fatal() {
        let (_db, router) = setup(false).await;
        let router = router.with_inbox(Arc::new(BrokenInbox));

        let err = router.send(&payload(Some(ChannelType::Sms))).await.unwrap_err();
        assert!(matches!(err, NotifyError::Inbox(_)));
    }

    #[tokio::test]
    async fn default_channel_applies_when_payload_has_none() {
        let (_db, router) = setup(true).await;
        let router = router
            .with_default_channel(ChannelType::Sms)
            .with_carrier(ChannelType::Sms, ScriptedCarrier::new(Behaviour::Accept));

        let result = router.send(&payload(None)).await.unwrap();
        assert_eq!(result.channel_used, ChannelType::Sms);
    }
}
