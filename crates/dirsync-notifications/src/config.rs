use serde::{Deserialize, Serialize};

/// Default SendGrid API endpoint.
pub const SENDGRID_API_URL: &str = "https://api.sendgrid.com";

fn default_sendgrid_url() -> String {
    SENDGRID_API_URL.to_string()
}

fn default_subject_prefix() -> String {
    "[dirsync]".to_string()
}

/// Outgoing mail settings.
///
/// SendGrid is used when `api_key` is set, SMTP when `smtp_host` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Master switch. When off, sync-error emails are only logged.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    // SendGrid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_sendgrid_url")]
    pub sendgrid_url: String,

    // SMTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,

    /// Base URL of the admin console, linked from emails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_console_url: Option<String>,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from: None,
            api_key: None,
            sendgrid_url: default_sendgrid_url(),
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            admin_console_url: None,
            subject_prefix: default_subject_prefix(),
        }
    }
}

impl MailerConfig {
    /// Checks that an enabled mailer can actually send.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.from.as_deref().is_none_or(str::is_empty) {
            return Err("notifications.from is required when notifications are enabled".into());
        }
        if self.api_key.is_none() && self.smtp_host.is_none() {
            return Err(
                "notifications need either api_key (SendGrid) or smtp_host when enabled".into(),
            );
        }
        Ok(())
    }
}
