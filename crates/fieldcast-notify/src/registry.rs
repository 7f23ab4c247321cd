//! Channel provider registry.
//!
//! Read side used by the dispatch router, plus the small administrative
//! surface used by configuration tooling. The in-application channel never
//! has a provider row and is always available.

use std::sync::Arc;

use fieldcast_core::ChannelType;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::dispatch::CarrierError;
use crate::storage::{ChannelProviderRow, DatabaseError, NotifyDatabase, ProviderParams};

/// Settings for a short-message carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsConfig {
    pub api_url: String,
    pub sender_id: String,
    pub auth_token: String,
}

/// Settings for a business-chat carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub phone_number_id: String,
    pub auth_token: String,
}

/// Typed provider configuration, one variant per external channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Sms(SmsConfig),
    WhatsAppBusiness(WhatsAppConfig),
}

impl ProviderConfig {
    pub const fn channel(&self) -> ChannelType {
        match self {
            Self::Sms(_) => ChannelType::Sms,
            Self::WhatsAppBusiness(_) => ChannelType::WhatsAppBusiness,
        }
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Sms(cfg) => serde_json::to_string(cfg),
            Self::WhatsAppBusiness(cfg) => serde_json::to_string(cfg),
        }
    }
}

/// An active or inactive external channel provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelProvider {
    pub id: String,
    pub channel: ChannelType,
    pub provider_name: String,
    pub is_active: bool,
    pub priority: i64,
    /// Raw configuration blob; decode with [`ChannelProvider::typed_config`].
    #[serde(skip)]
    pub config: String,
}

impl ChannelProvider {
    /// Decode the configuration blob for this provider's channel.
    pub fn typed_config(&self) -> Result<ProviderConfig, CarrierError> {
        let invalid =
            |e: serde_json::Error| CarrierError::Config(format!("provider {}: {e}", self.id));
        match self.channel {
            ChannelType::Sms => serde_json::from_str(&self.config)
                .map(ProviderConfig::Sms)
                .map_err(invalid),
            ChannelType::WhatsAppBusiness => serde_json::from_str(&self.config)
                .map(ProviderConfig::WhatsAppBusiness)
                .map_err(invalid),
            ChannelType::Internal => Err(CarrierError::Config(format!(
                "provider {} is bound to the internal channel",
                self.id
            ))),
        }
    }
}

impl TryFrom<ChannelProviderRow> for ChannelProvider {
    type Error = DatabaseError;

    fn try_from(row: ChannelProviderRow) -> Result<Self, Self::Error> {
        let channel = row
            .channel_type
            .parse()
            .map_err(|e: fieldcast_core::Error| DatabaseError::Decode(e.to_string()))?;
        Ok(Self {
            id: row.id,
            channel,
            provider_name: row.provider_name,
            is_active: row.is_active,
            priority: row.priority,
            config: row.config,
        })
    }
}

/// Availability of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelType,
    pub available: bool,
    pub active_providers: usize,
}

/// Channel provider registry backed by the notification database.
#[derive(Clone)]
pub struct ProviderRegistry {
    db: NotifyDatabase,
    clock: Arc<dyn Clock>,
}

impl ProviderRegistry {
    pub fn new(db: NotifyDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Active providers, highest priority first.
    pub async fn list_active_providers(&self) -> Result<Vec<ChannelProvider>, DatabaseError> {
        self.db
            .list_active_providers()
            .await?
            .into_iter()
            .map(ChannelProvider::try_from)
            .collect()
    }

    /// Highest-priority active provider for an external channel.
    pub async fn provider_for(
        &self,
        channel: ChannelType,
    ) -> Result<Option<ChannelProvider>, DatabaseError> {
        if !channel.is_external() {
            return Ok(None);
        }
        self.db
            .list_active_providers_for(channel.as_str())
            .await?
            .into_iter()
            .next()
            .map(ChannelProvider::try_from)
            .transpose()
    }

    /// Whether a channel can carry a message right now.
    pub async fn is_channel_available(&self, channel: ChannelType) -> Result<bool, DatabaseError> {
        match channel {
            ChannelType::Internal => Ok(true),
            ChannelType::Sms | ChannelType::WhatsAppBusiness => {
                Ok(self.provider_for(channel).await?.is_some())
            }
        }
    }

    /// Availability of every channel, in display order.
    pub async fn channel_status(&self) -> Result<Vec<ChannelStatus>, DatabaseError> {
        let active = self.list_active_providers().await?;
        Ok(ChannelType::ALL
            .into_iter()
            .map(|channel| {
                let active_providers = active.iter().filter(|p| p.channel == channel).count();
                ChannelStatus {
                    channel,
                    available: !channel.is_external() || active_providers > 0,
                    active_providers,
                }
            })
            .collect())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Create or replace a provider.
    pub async fn register_provider(
        &self,
        id: &str,
        provider_name: &str,
        priority: i64,
        config: &ProviderConfig,
    ) -> Result<ChannelProvider, DatabaseError> {
        let blob = config
            .to_json()
            .map_err(|e| DatabaseError::Query(format!("provider config: {e}")))?;
        let channel = config.channel();
        let row = self
            .db
            .upsert_provider(&ProviderParams {
                id,
                channel_type: channel.as_str(),
                provider_name,
                is_active: true,
                priority,
                config: &blob,
                now: self.clock.now(),
            })
            .await?;

        info!(provider_id = %id, channel = %channel, priority, "Channel provider registered");
        ChannelProvider::try_from(row)
    }

    /// Enable or disable a provider.
    pub async fn set_provider_active(&self, id: &str, active: bool) -> Result<(), DatabaseError> {
        self.db
            .set_provider_active(id, active, self.clock.now())
            .await?;
        info!(provider_id = %id, active, "Channel provider toggled");
        Ok(())
    }

    /// Every provider, active or not.
    pub async fn list_providers(&self) -> Result<Vec<ChannelProvider>, DatabaseError> {
        self.db
            .list_providers()
            .await?
            .into_iter()
            .map(ChannelProvider::try_from)
            .collect()
    }
}
