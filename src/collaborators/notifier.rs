//! Outbound notification channel.
//!
//! Delivery is best effort: the workflow fires engagement messages and
//! never blocks on the result, so this client keeps no retry loop.

use serde::Serialize;
use tracing::info;

use super::{Notifier, NotifyError};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierProviderType {
    SendGrid,
    Mock,
    None,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub provider: NotifierProviderType,
    pub sendgrid_api_key: Option<String>,
    pub from_address: String,
}

#[derive(Clone)]
pub struct EmailNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendGridPayload<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

impl EmailNotifier {
    pub fn from_env() -> Self {
        let provider = match env_string("NOTIFY_PROVIDER").as_deref() {
            Some("sendgrid") => NotifierProviderType::SendGrid,
            Some("mock") => NotifierProviderType::Mock,
            _ => NotifierProviderType::None,
        };

        let config = NotifierConfig {
            provider,
            sendgrid_api_key: env_string("SENDGRID_API_KEY"),
            from_address: env_string("NOTIFY_FROM")
                .unwrap_or_else(|| "coach@certpath.app".into()),
        };

        Self { config, client: reqwest::Client::new() }
    }

    pub fn is_available(&self) -> bool {
        match self.config.provider {
            NotifierProviderType::SendGrid => self.config.sendgrid_api_key.is_some(),
            NotifierProviderType::Mock => true,
            NotifierProviderType::None => false,
        }
    }

    async fn send_via_sendgrid(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let api_key = self
            .config
            .sendgrid_api_key
            .as_deref()
            .ok_or(NotifyError::NotConfigured("SENDGRID_API_KEY"))?;

        let payload = SendGridPayload {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress { email: to }],
            }],
            from: SendGridAddress {
                email: &self.config.from_address,
            },
            subject,
            content: vec![SendGridContent {
                content_type: "text/plain",
                value: body,
            }],
        };

        let resp = self
            .client
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::HttpStatus { status, body });
        }

        Ok(())
    }
}

impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        match self.config.provider {
            NotifierProviderType::SendGrid => {
                self.send_via_sendgrid(recipient, subject, body).await
            }
            NotifierProviderType::Mock => {
                info!(%recipient, %subject, "mock notification");
                Ok(())
            }
            NotifierProviderType::None => Err(NotifyError::NotConfigured("NOTIFY_PROVIDER")),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
