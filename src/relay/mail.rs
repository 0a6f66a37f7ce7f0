use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use super::RelayError;
use crate::config::MailConfig;

/// Body accepted by the send-email endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl EmailRequest {
    pub fn validate(&self) -> Result<(), RelayError> {
        let to = self.to.trim();
        if to.is_empty() || !to.contains('@') || to.starts_with('@') || to.ends_with('@') {
            return Err(RelayError::InvalidMessage(format!("Invalid recipient: {}", self.to)));
        }
        if self.subject.trim().is_empty() {
            return Err(RelayError::InvalidMessage("Subject is required".to_string()));
        }
        if self.html.trim().is_empty() {
            return Err(RelayError::InvalidMessage("Message body is required".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &EmailRequest) -> Result<(), RelayError>;
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload<'a> {
    sender: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

/// Forwards messages to the transactional mail relay
pub struct HttpMailer {
    http: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("staffing-planner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &EmailRequest) -> Result<(), RelayError> {
        let (Some(url), Some(api_key)) = (&self.config.relay_url, &self.config.api_key) else {
            return Err(RelayError::NotConfigured);
        };
        let payload = RelayPayload {
            sender: Address { email: &self.config.sender, name: self.config.sender_name.as_deref() },
            to: vec![Address { email: email.to.trim(), name: None }],
            subject: &email.subject,
            html_content: &email.html,
        };
        let response = self
            .http
            .post(url)
            .header("api-key", api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected(format!("{} {}", status, body)));
        }
        info!(to = %email.to, subject = %email.subject, "email relayed");
        Ok(())
    }
}

/// Keeps messages in memory instead of sending them
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailRequest>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailRequest> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &EmailRequest) -> Result<(), RelayError> {
        info!(to = %email.to, "email recorded (no relay configured)");
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
