use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::MailerConfig;
use crate::error::NotificationError;

/// Result of sending one email
#[derive(Debug)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

/// Rendered email content
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
}

/// Delivers rendered emails through SendGrid or SMTP.
#[derive(Debug, Clone)]
pub struct EmailSender {
    http_client: Client,
}

impl EmailSender {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    /// Sends `content` to `to`, picking the transport from `config`.
    pub async fn send(
        &self,
        config: &MailerConfig,
        to: &str,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError> {
        if config.api_key.is_some() {
            self.send_sendgrid(config, to, content).await
        } else if config.smtp_host.is_some() {
            self.send_smtp(config, to, content).await
        } else {
            Err(NotificationError::InvalidConfig(
                "No email transport configured".into(),
            ))
        }
    }

    async fn send_sendgrid(
        &self,
        config: &MailerConfig,
        to: &str,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or(NotificationError::InvalidConfig("Missing api_key".into()))?;

        let from = config
            .from
            .as_ref()
            .ok_or(NotificationError::InvalidConfig("Missing from".into()))?;

        let subject = content.subject.as_deref().unwrap_or("Notification");

        let mut body_parts = vec![json!({"type": "text/plain", "value": content.body})];
        if let Some(html) = &content.html_body {
            body_parts.push(json!({"type": "text/html", "value": html}));
        }

        let body = json!({
            "personalizations": [{
                "to": [{"email": to}]
            }],
            "from": {"email": from},
            "subject": subject,
            "content": body_parts
        });

        let url = format!("{}/v3/mail/send", config.sendgrid_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        if response.status().is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            debug!(message_id = ?message_id, "Email accepted by SendGrid");
            Ok(SendResult {
                success: true,
                external_id: message_id,
                error: None,
            })
        } else {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            Ok(SendResult {
                success: false,
                external_id: None,
                error: Some(format!("{status}: {error}")),
            })
        }
    }

    async fn send_smtp(
        &self,
        config: &MailerConfig,
        to: &str,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError> {
        let host = config
            .smtp_host
            .as_ref()
            .ok_or(NotificationError::InvalidConfig("Missing smtp_host".into()))?;

        let port = config.smtp_port.unwrap_or(587);

        let from = config
            .from
            .as_ref()
            .ok_or(NotificationError::InvalidConfig("Missing from".into()))?;

        let subject = content.subject.as_deref().unwrap_or("Notification");

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| NotificationError::InvalidConfig(format!("Invalid from: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotificationError::InvalidRecipient(format!("{to}: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.body.clone())
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let mut mailer_builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?
            .port(port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            mailer_builder =
                mailer_builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = mailer_builder.build();

        match mailer.send(email).await {
            Ok(response) => Ok(SendResult {
                success: true,
                external_id: Some(response.message().collect::<Vec<_>>().join(" ")),
                error: None,
            }),
            Err(e) => Ok(SendResult {
                success: false,
                external_id: None,
                error: Some(e.to_string()),
            }),
        }
    }
}

impl Default for EmailSender {
    fn default() -> Self {
        Self::new()
    }
}
