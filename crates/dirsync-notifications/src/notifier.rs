//! [`SyncErrorNotifier`] that emails account administrators.

use std::collections::HashMap;

use async_trait::async_trait;
use dirsync_core::{NotifyError, Provider, SyncErrorNotifier};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use tracing::{info, instrument, warn};

use crate::config::MailerConfig;
use crate::email::EmailSender;
use crate::error::NotificationError;
use crate::templates::{SYNC_ERROR_TEMPLATE, TemplateRenderer};

/// Renders the sync-error template and delivers it.
#[derive(Debug)]
pub struct EmailNotifier {
    config: MailerConfig,
    sender: EmailSender,
    renderer: TemplateRenderer,
}

impl EmailNotifier {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            sender: EmailSender::new(),
            renderer: TemplateRenderer::with_builtin(),
        }
    }

    /// Template variables describing the provider's failure streak.
    fn template_data(&self, provider: &Provider) -> HashMap<String, Value> {
        let last_synced_at = provider
            .last_synced_at
            .and_then(|at| at.format(&Rfc3339).ok())
            .unwrap_or_else(|| "never".to_string());

        let disabled_notice = if provider.sync_disabled_at.is_some() {
            "\nSync has been disabled for this provider and will not run again until it is \
             re-enabled.\n"
        } else {
            ""
        };

        let provider_url = match &self.config.admin_console_url {
            Some(base) => format!(
                "{}/{}/settings/identity_providers/{}",
                base.trim_end_matches('/'),
                provider.account_id,
                provider.id
            ),
            None => "the admin console".to_string(),
        };

        [
            ("subject_prefix", json!(self.config.subject_prefix)),
            ("provider_name", json!(provider.name)),
            ("adapter", json!(provider.adapter.as_str())),
            ("failures", json!(provider.last_syncs_failed)),
            (
                "last_sync_error",
                json!(provider.last_sync_error.as_deref().unwrap_or("unknown error")),
            ),
            ("last_synced_at", json!(last_synced_at)),
            ("disabled_notice", json!(disabled_notice)),
            ("provider_url", json!(provider_url)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    async fn send_sync_error(
        &self,
        provider: &Provider,
        admin_email: &str,
    ) -> Result<(), NotificationError> {
        if !self.config.enabled {
            info!(
                provider_id = %provider.id,
                to = admin_email,
                "Notifications disabled; not sending sync error email"
            );
            return Ok(());
        }

        let content = self
            .renderer
            .render(SYNC_ERROR_TEMPLATE, &self.template_data(provider))?;
        let result = self.sender.send(&self.config, admin_email, &content).await?;

        if result.success {
            info!(
                provider_id = %provider.id,
                to = admin_email,
                external_id = ?result.external_id,
                "Sent sync error email"
            );
            Ok(())
        } else {
            let error = result.error.unwrap_or_default();
            warn!(provider_id = %provider.id, to = admin_email, %error, "Sync error email rejected");
            Err(NotificationError::SendFailed(error))
        }
    }
}

#[async_trait]
impl SyncErrorNotifier for EmailNotifier {
    #[instrument(skip_all, fields(provider_id = %provider.id))]
    async fn notify_sync_error(
        &self,
        provider: &Provider,
        admin_email: &str,
    ) -> Result<(), NotifyError> {
        self.send_sync_error(provider, admin_email)
            .await
            .map_err(|e| Box::new(e) as NotifyError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_core::AdapterType;

    fn failing_provider() -> Provider {
        let mut provider = Provider::new(
            uuid::Uuid::new_v4(),
            "Corporate Okta",
            AdapterType::Okta,
            serde_json::json!({}),
        );
        provider.last_syncs_failed = 4;
        provider.last_sync_error = Some("401 Unauthorized".into());
        provider
    }

    #[test]
    fn test_template_data_describes_streak() {
        let notifier = EmailNotifier::new(MailerConfig {
            admin_console_url: Some("https://admin.example.com/".into()),
            ..Default::default()
        });
        let provider = failing_provider();

        let data = notifier.template_data(&provider);

        assert_eq!(data["failures"], json!(4));
        assert_eq!(data["last_synced_at"], json!("never"));
        assert_eq!(data["disabled_notice"], json!(""));
        assert_eq!(
            data["provider_url"],
            json!(format!(
                "https://admin.example.com/{}/settings/identity_providers/{}",
                provider.account_id, provider.id
            ))
        );
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let notifier = EmailNotifier::new(MailerConfig::default());
        notifier
            .notify_sync_error(&failing_provider(), "admin@example.com")
            .await
            .unwrap();
    }
}
