//! External carrier adapters.
//!
//! [`HttpCarrier`] speaks JSON over HTTP to short-message gateways and to the
//! business-chat Cloud API. [`SimulatedCarrier`] accepts everything and hands
//! back a pending identifier, for deployments without a real carrier.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::CarrierError;
use crate::registry::{ChannelProvider, ProviderConfig, SmsConfig, WhatsAppConfig};

/// Outcome of a carrier attempt that reached the carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierReceipt {
    pub accepted: bool,
    /// Carrier-assigned identifier, used to correlate asynchronous receipts.
    pub external_id: Option<String>,
}

/// Transport for one external channel type.
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    async fn attempt_send(
        &self,
        provider: &ChannelProvider,
        contact: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<CarrierReceipt, CarrierError>;
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    from: &'a str,
    to: &'a str,
    text: String,
}

#[derive(Debug, Serialize)]
struct WhatsAppRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: WhatsAppText,
}

#[derive(Debug, Serialize)]
struct WhatsAppText {
    body: String,
}

/// HTTP carrier client.
#[derive(Debug, Clone)]
pub struct HttpCarrier {
    http: reqwest::Client,
}

impl HttpCarrier {
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Build a carrier with a default HTTP client.
    ///
    /// A rustls crypto provider must already be installed.
    pub fn with_default_client() -> Result<Self, CarrierError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CarrierError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Create a carrier for testing purposes only.
    #[cfg(test)]
    #[allow(clippy::expect_used)]
    pub(crate) fn for_testing() -> Self {
        // Install ring as the default crypto provider (no-op if already installed).
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .build()
            .expect("failed to build test HTTP client");
        Self { http }
    }

    fn message_text(subject: &str, body: &str) -> String {
        if subject.is_empty() {
            body.to_string()
        } else {
            format!("{subject}\n\n{body}")
        }
    }

    async fn send_sms(
        &self,
        cfg: &SmsConfig,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<CarrierReceipt, CarrierError> {
        let request = SmsRequest {
            from: &cfg.sender_id,
            to,
            text: Self::message_text(subject, body),
        };
        let response = self
            .http
            .post(&cfg.api_url)
            .bearer_auth(&cfg.auth_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| CarrierError::Request(e.to_string()))?;

        let payload = Self::check(response).await?;
        let external_id = payload
            .get("message_id")
            .or_else(|| payload.get("id"))
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned);
        Ok(CarrierReceipt {
            accepted: true,
            external_id,
        })
    }

    async fn send_whatsapp(
        &self,
        cfg: &WhatsAppConfig,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<CarrierReceipt, CarrierError> {
        let url = format!(
            "{}/{}/messages",
            cfg.api_url.trim_end_matches('/'),
            cfg.phone_number_id
        );
        let request = WhatsAppRequest {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: WhatsAppText {
                body: Self::message_text(subject, body),
            },
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.auth_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| CarrierError::Request(e.to_string()))?;

        let payload = Self::check(response).await?;
        let external_id = payload
            .pointer("/messages/0/id")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned);
        Ok(CarrierReceipt {
            accepted: true,
            external_id,
        })
    }

    /// Map a non-2xx response to `Rejected`, otherwise return the JSON body.
    async fn check(response: reqwest::Response) -> Result<serde_json::Value, CarrierError> {
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Carrier accepted message");
            // An empty or non-JSON acknowledgement still counts as accepted.
            Ok(response.json().await.unwrap_or(serde_json::Value::Null))
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Carrier returned error");
            Err(CarrierError::Rejected {
                status: status_code,
                body,
            })
        }
    }
}

#[async_trait]
impl CarrierAdapter for HttpCarrier {
    async fn attempt_send(
        &self,
        provider: &ChannelProvider,
        contact: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<CarrierReceipt, CarrierError> {
        let to = contact
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CarrierError::Config("recipient has no contact address".into()))?;

        match provider.typed_config()? {
            ProviderConfig::Sms(cfg) => self.send_sms(&cfg, to, subject, body).await,
            ProviderConfig::WhatsAppBusiness(cfg) => {
                self.send_whatsapp(&cfg, to, subject, body).await
            }
        }
    }
}

/// Carrier stand-in that queues nothing and accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedCarrier;

#[async_trait]
impl CarrierAdapter for SimulatedCarrier {
    async fn attempt_send(
        &self,
        provider: &ChannelProvider,
        _contact: Option<&str>,
        _subject: &str,
        _body: &str,
    ) -> Result<CarrierReceipt, CarrierError> {
        let external_id = format!("sim-{}", uuid::Uuid::new_v4());
        debug!(provider_id = %provider.id, %external_id, "Simulated carrier send");
        Ok(CarrierReceipt {
            accepted: true,
            external_id: Some(external_id),
        })
    }
}
