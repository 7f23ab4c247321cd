//! Audience resolution.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use fieldcast_core::ChannelType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NotifyError;

/// Membership statuses that qualify a holder for farm broadcasts.
pub const QUALIFYING_STATUSES: [&str; 3] = ["paid", "confirmed", "active"];

/// One qualifying (recipient, membership) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceMember {
    pub recipient_id: String,
    pub membership_id: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub preferred_channel: Option<ChannelType>,
}

/// Resolves the qualifying memberships of a farm.
///
/// May return several memberships for the same recipient; the composer
/// collapses them.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn qualifying_members(&self, farm_id: &str) -> Result<Vec<AudienceMember>, NotifyError>;
}

/// Keep the first membership seen for each recipient, preserving order.
pub fn dedupe_audience(members: Vec<AudienceMember>) -> Vec<AudienceMember> {
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter(|m| seen.insert(m.recipient_id.clone()))
        .collect()
}

/// A membership as held by the static provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub farm_id: String,
    pub recipient_id: String,
    pub membership_id: String,
    pub status: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub preferred_channel: Option<ChannelType>,
}

impl MembershipRecord {
    fn qualifies(&self) -> bool {
        QUALIFYING_STATUSES
            .iter()
            .any(|s| self.status.eq_ignore_ascii_case(s))
    }
}

/// In-memory membership provider, loadable from a JSON array of
/// [`MembershipRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct StaticMembershipProvider {
    records: Vec<MembershipRecord>,
}

impl StaticMembershipProvider {
    pub const fn new(records: Vec<MembershipRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, NotifyError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NotifyError::Membership(format!(
                "Failed to read memberships file {}: {e}",
                path.display()
            ))
        })?;
        let records: Vec<MembershipRecord> = serde_json::from_str(&content).map_err(|e| {
            NotifyError::Membership(format!(
                "Failed to parse memberships file {}: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), records = records.len(), "Memberships loaded");
        Ok(Self { records })
    }

    pub fn push(&mut self, record: MembershipRecord) {
        self.records.push(record);
    }
}

#[async_trait]
impl MembershipProvider for StaticMembershipProvider {
    async fn qualifying_members(&self, farm_id: &str) -> Result<Vec<AudienceMember>, NotifyError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.farm_id == farm_id && r.qualifies())
            .map(|r| AudienceMember {
                recipient_id: r.recipient_id.clone(),
                membership_id: r.membership_id.clone(),
                contact: r.contact.clone(),
                preferred_channel: r.preferred_channel,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(farm: &str, recipient: &str, membership: &str, status: &str) -> MembershipRecord {
        MembershipRecord {
            farm_id: farm.into(),
            recipient_id: recipient.into(),
            membership_id: membership.into(),
            status: status.into(),
            contact: None,
            preferred_channel: None,
        }
    }

    #[tokio::test]
    async fn only_qualifying_statuses_in_the_farm_are_returned() {
        let provider = StaticMembershipProvider::new(vec![
            record("f1", "x", "r1", "paid"),
            record("f1", "y", "r2", "Confirmed"),
            record("f1", "z", "r3", "cancelled"),
            record("f2", "w", "r4", "active"),
        ]);

        let members = provider.qualifying_members("f1").await.unwrap();
        let ids: Vec<_> = members.iter().map(|m| m.recipient_id.as_str()).collect();
        assert_eq!(ids, ["x", "y"]);
    }

    #[test]
    fn dedupe_keeps_first_membership() {
        let member = |r: &str, m: &str| AudienceMember {
            recipient_id: r.into(),
            membership_id: m.into(),
            contact: None,
            preferred_channel: None,
        };
        let deduped = dedupe_audience(vec![member("x", "r1"), member("y", "r2"), member("x", "r3")]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].membership_id, "r1");
        assert_eq!(deduped[1].recipient_id, "y");
    }

    #[test]
    fn loads_records_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        std::fs::write(
            &path,
            r#"[{"farm_id":"f1","recipient_id":"x","membership_id":"r1","status":"paid",
                 "contact":"+254700000001","preferred_channel":"sms"}]"#,
        )
        .unwrap();

        let provider = StaticMembershipProvider::from_json_file(&path).unwrap();
        assert_eq!(provider.records.len(), 1);
        assert_eq!(provider.records[0].preferred_channel, Some(ChannelType::Sms));
    }

    #[test]
    fn missing_file_is_a_membership_error() {
        let err = StaticMembershipProvider::from_json_file(Path::new("/nonexistent/members.json"))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Membership(_)));
    }
}
