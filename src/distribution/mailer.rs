use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use super::{parse_recipients, DistributionError, PDF_CONTENT_TYPE};
use crate::config::MailConfig;

/// File attached to an outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub text: String,
    pub attachment: Option<MailAttachment>,
}

/// Delivers a fully-addressed message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DistributionError>;
}

// ═══════════════════════════════════════════════════════════
// SendGrid v3
// ═══════════════════════════════════════════════════════════

pub struct SendGridTransport {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl SendGridTransport {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client with timeout, using default client");
                reqwest::Client::new()
            });
        Self {
            api_key: api_key.to_string(),
            base_url: "https://api.sendgrid.com".to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(&config.sendgrid_api_key).with_base_url(&config.sendgrid_base_url)
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct Attachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    disposition: &'static str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment<'a>>,
}

impl<'a> SendRequest<'a> {
    fn from_mail(mail: &'a OutgoingMail) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: mail.to.iter().map(|email| Address { email }).collect(),
            }],
            from: Address { email: &mail.from },
            subject: &mail.subject,
            content: vec![Content {
                kind: "text/plain",
                value: &mail.text,
            }],
            attachments: mail
                .attachment
                .iter()
                .map(|a| Attachment {
                    content: BASE64.encode(&a.bytes),
                    filename: &a.filename,
                    kind: &a.content_type,
                    disposition: "attachment",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl MailTransport for SendGridTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DistributionError> {
        let url = format!("{}/v3/mail/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest::from_mail(mail))
            .send()
            .await
            .map_err(|e| DistributionError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DistributionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Distributor
// ═══════════════════════════════════════════════════════════

/// Addresses summary mail and hands it to the transport.
pub struct Distributor {
    transport: Arc<dyn MailTransport>,
    recipients: String,
    sender: String,
}

impl Distributor {
    pub fn new(transport: Arc<dyn MailTransport>, recipients: &str, sender: &str) -> Self {
        Self {
            transport,
            recipients: recipients.to_string(),
            sender: sender.to_string(),
        }
    }

    pub fn from_config(config: &MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self::new(transport, &config.recipients, &config.sender)
    }

    /// Send `body` to every configured recipient, attaching the document
    /// when present. Fails with `NoRecipients` before any network call if
    /// the recipient list is empty.
    pub async fn send_email(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<&[u8]>,
        filename: &str,
    ) -> Result<(), DistributionError> {
        let to = parse_recipients(&self.recipients);
        if to.is_empty() {
            return Err(DistributionError::NoRecipients);
        }

        let mail = OutgoingMail {
            to,
            from: self.sender.clone(),
            subject: subject.to_string(),
            text: body.to_string(),
            attachment: attachment.map(|bytes| MailAttachment {
                filename: filename.to_string(),
                content_type: PDF_CONTENT_TYPE.to_string(),
                bytes: bytes.to_vec(),
            }),
        };

        self.transport.send(&mail).await?;
        tracing::info!(
            recipients = mail.to.len(),
            attachment = mail.attachment.is_some(),
            "Summary email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
pub use mock::MockMailTransport;

#[cfg(test)]
mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Records every message; optionally fails each send.
    #[derive(Default)]
    pub struct MockMailTransport {
        sent: Mutex<Vec<OutgoingMail>>,
        fail_status: Option<u16>,
    }

    impl MockMailTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(status: u16) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_status: Some(status),
            }
        }

        pub fn sent(&self) -> Vec<OutgoingMail> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl MailTransport for MockMailTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), DistributionError> {
            if let Some(status) = self.fail_status {
                return Err(DistributionError::Status {
                    status,
                    body: "mock failure".into(),
                });
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(mail.clone());
            }
            Ok(())
        }
    }
}
