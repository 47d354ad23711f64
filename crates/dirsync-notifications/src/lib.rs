//! Sync-error emails for the dirsync engine.
//!
//! [`EmailNotifier`] implements [`dirsync_core::SyncErrorNotifier`]: it
//! renders the built-in `sync_error` template and delivers it through
//! SendGrid or SMTP, whichever [`MailerConfig`] names.

pub mod config;
pub mod email;
pub mod error;
pub mod notifier;
pub mod templates;

pub use config::MailerConfig;
pub use email::{EmailSender, RenderedContent, SendResult};
pub use error::NotificationError;
pub use notifier::EmailNotifier;
pub use templates::{SYNC_ERROR_TEMPLATE, Template, TemplateRenderer};
