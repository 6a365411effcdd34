//! Badge delivery via the mail relay
//!
//! Delivery is best-effort: the participant record is persisted whether or
//! not the confirmation message goes out. When no relay is configured the
//! notifier degrades to a no-op that logs what it would have sent.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::TurnstileError;

/// Payload posted to the mail relay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeMessage {
    pub to: String,
    pub participant_name: String,
    pub subject: String,
    /// SVG badge, base64-encoded
    pub badge_svg_base64: String,
}

impl BadgeMessage {
    pub fn new(to: &str, participant_name: &str, badge_svg: &str) -> Self {
        Self {
            to: to.to_string(),
            participant_name: participant_name.to_string(),
            subject: "Your event badge".to_string(),
            badge_svg_base64: base64::engine::general_purpose::STANDARD.encode(badge_svg),
        }
    }
}

/// Outbound notification seam, mockable in tests
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_badge(&self, message: BadgeMessage) -> Result<(), TurnstileError>;
}

/// Notifier that forwards badge messages to a configured HTTP mail relay
pub struct MailRelayNotifier {
    client: reqwest::Client,
    relay_url: Option<String>,
}

impl MailRelayNotifier {
    pub fn new(relay_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, relay_url }
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send_badge(&self, message: BadgeMessage) -> Result<(), TurnstileError> {
        let url = match &self.relay_url {
            Some(u) => u.clone(),
            None => {
                info!("No mail relay configured, skipping badge delivery to {}", message.to);
                return Ok(());
            }
        };

        let response = self
            .client
            .post(format!("{}/send", url.trim_end_matches('/')))
            .json(&message)
            .send()
            .await
            .map_err(|e| TurnstileError::Mail(format!("Relay unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Mail relay rejected badge for {}: {} {}", message.to, status, body);
            return Err(TurnstileError::Mail(format!(
                "Relay returned {}: {}",
                status, body
            )));
        }

        info!("Badge delivered to {}", message.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_message_encodes_svg() {
        let msg = BadgeMessage::new("dana@example.com", "Dana", "<svg></svg>");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&msg.badge_svg_base64)
            .unwrap();
        assert_eq!(decoded, b"<svg></svg>");
    }

    #[tokio::test]
    async fn test_unconfigured_relay_is_noop() {
        let notifier = MailRelayNotifier::new(None);
        let msg = BadgeMessage::new("dana@example.com", "Dana", "<svg></svg>");
        assert!(notifier.send_badge(msg).await.is_ok());
    }
}
