//! Channel provider queries.

use super::db::{DatabaseError, NotifyDatabase};
use super::models::ChannelProviderRow;

/// Parameters for creating or replacing a channel provider.
pub struct ProviderParams<'a> {
    pub id: &'a str,
    pub channel_type: &'a str,
    pub provider_name: &'a str,
    pub is_active: bool,
    pub priority: i64,
    /// Carrier configuration as JSON text.
    pub config: &'a str,
    pub now: i64,
}

impl NotifyDatabase {
    // =========================================================================
    // Channel provider queries
    // =========================================================================

    /// Insert a provider, or replace its settings if the ID exists.
    ///
    /// `created_at` is preserved on replace.
    pub async fn upsert_provider(
        &self,
        params: &ProviderParams<'_>,
    ) -> Result<ChannelProviderRow, DatabaseError> {
        sqlx::query(
            "INSERT INTO channel_providers (id, channel_type, provider_name, is_active, priority, config, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
               channel_type = excluded.channel_type, \
               provider_name = excluded.provider_name, \
               is_active = excluded.is_active, \
               priority = excluded.priority, \
               config = excluded.config, \
               updated_at = excluded.updated_at",
        )
        .bind(params.id)
        .bind(params.channel_type)
        .bind(params.provider_name)
        .bind(params.is_active)
        .bind(params.priority)
        .bind(params.config)
        .bind(params.now)
        .bind(params.now)
        .execute(self.pool())
        .await?;

        self.get_provider(params.id).await
    }

    /// Get a provider by ID.
    pub async fn get_provider(&self, id: &str) -> Result<ChannelProviderRow, DatabaseError> {
        sqlx::query_as::<_, ChannelProviderRow>("SELECT * FROM channel_providers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Channel provider {id}")))
    }

    /// Enable or disable a provider.
    pub async fn set_provider_active(
        &self,
        id: &str,
        is_active: bool,
        now: i64,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE channel_providers SET is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(is_active)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Channel provider {id}")));
        }

        Ok(())
    }

    /// List every provider, active or not.
    pub async fn list_providers(&self) -> Result<Vec<ChannelProviderRow>, DatabaseError> {
        let providers = sqlx::query_as::<_, ChannelProviderRow>(
            "SELECT * FROM channel_providers ORDER BY channel_type ASC, priority DESC, created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(providers)
    }

    /// List active providers, highest priority first.
    pub async fn list_active_providers(&self) -> Result<Vec<ChannelProviderRow>, DatabaseError> {
        let providers = sqlx::query_as::<_, ChannelProviderRow>(
            "SELECT * FROM channel_providers WHERE is_active = 1 \
             ORDER BY priority DESC, created_at ASC, rowid ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(providers)
    }

    /// List active providers for one channel, highest priority first.
    pub async fn list_active_providers_for(
        &self,
        channel_type: &str,
    ) -> Result<Vec<ChannelProviderRow>, DatabaseError> {
        let providers = sqlx::query_as::<_, ChannelProviderRow>(
            "SELECT * FROM channel_providers WHERE is_active = 1 AND channel_type = ? \
             ORDER BY priority DESC, created_at ASC, rowid ASC",
        )
        .bind(channel_type)
        .fetch_all(self.pool())
        .await?;

        Ok(providers)
    }
}
