//! Delivery channel and priority enumerations.
//!
//! Both are stored as lowercase strings in the database and accepted as
//! strings on the CLI; the enums are the only place those strings are
//! interpreted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A delivery medium for an outbound notification.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// The in-application inbox. Always available; never backed by a provider.
    #[default]
    Internal,
    /// Short-message carrier.
    Sms,
    /// Business-chat carrier.
    #[serde(rename = "whatsapp", alias = "whatsapp_business")]
    WhatsAppBusiness,
}

impl ChannelType {
    /// Every channel, in display order.
    pub const ALL: [Self; 3] = [Self::Internal, Self::Sms, Self::WhatsAppBusiness];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Sms => "sms",
            Self::WhatsAppBusiness => "whatsapp",
        }
    }

    /// Whether delivery over this channel goes through an external carrier.
    pub const fn is_external(&self) -> bool {
        !matches!(self, Self::Internal)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" | "in_app" | "inapp" => Ok(Self::Internal),
            "sms" => Ok(Self::Sms),
            "whatsapp" | "whatsapp_business" => Ok(Self::WhatsAppBusiness),
            other => Err(Error::UnknownVariant {
                kind: "channel",
                value: other.to_string(),
            }),
        }
    }
}

/// Requested urgency of a notification.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(Error::UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn channel_strings_round_trip() {
        for channel in ChannelType::ALL {
            assert_eq!(channel.as_str().parse::<ChannelType>().unwrap(), channel);
        }
    }

    #[test]
    fn channel_accepts_aliases() {
        assert_eq!(
            "WhatsApp_Business".parse::<ChannelType>().unwrap(),
            ChannelType::WhatsAppBusiness
        );
        assert_eq!("in_app".parse::<ChannelType>().unwrap(), ChannelType::Internal);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let err = "pigeon".parse::<ChannelType>().unwrap_err();
        assert!(err.to_string().contains("pigeon"));
    }

    #[test]
    fn only_internal_is_not_external() {
        assert!(!ChannelType::Internal.is_external());
        assert!(ChannelType::Sms.is_external());
        assert!(ChannelType::WhatsAppBusiness.is_external());
    }

    #[test]
    fn channel_serde_uses_storage_strings() {
        let json = serde_json::to_string(&ChannelType::WhatsAppBusiness).unwrap();
        assert_eq!(json, "\"whatsapp\"");
        let parsed: ChannelType = serde_json::from_str("\"whatsapp_business\"").unwrap();
        assert_eq!(parsed, ChannelType::WhatsAppBusiness);
    }

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("whenever".parse::<Priority>().is_err());
    }
}
