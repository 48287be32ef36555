use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Delivers mail through a JSON HTTP API (`POST {from, to, subject, text}`).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from,
        })
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.api_url).json(&OutgoingMail {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("mail API returned status {}", response.status());
        }
        Ok(())
    }
}

/// Used when no mail API is configured: the message only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "mail delivery not configured; message logged only");
        tracing::debug!(body = %message.text, "unsent mail body");
        Ok(())
    }
}

pub fn from_config(config: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    Ok(match &config.api_url {
        Some(url) => Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
        )?),
        None => Arc::new(LogMailer),
    })
}

/// Sends on a detached task; failures are logged and never reach the caller.
pub fn send_best_effort(mailer: Arc<dyn Mailer>, message: EmailMessage) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&message).await {
            tracing::warn!(to = %message.to, subject = %message.subject, error = %e, "failed to send email");
        }
    });
}

pub fn verification_email(to: &str, base_url: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your FreshCut account".to_string(),
        text: format!(
            "Welcome to FreshCut!\n\nConfirm your email address by opening:\n{}/api/auth/verify-email?token={}\n",
            base_url.trim_end_matches('/'),
            token
        ),
    }
}

pub fn password_reset_email(to: &str, base_url: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your FreshCut password".to_string(),
        text: format!(
            "We received a request to reset your password.\n\nOpen {}/reset-password?token={} within one hour to choose a new one.\nIf this wasn't you, ignore this email.\n",
            base_url.trim_end_matches('/'),
            token
        ),
    }
}
