use std::collections::HashMap;

use serde_json::Value;

use crate::email::RenderedContent;
use crate::error::NotificationError;

/// Id of the built-in template sent when a provider keeps failing to sync.
pub const SYNC_ERROR_TEMPLATE: &str = "sync_error";

const SYNC_ERROR_SUBJECT: &str = "{{subject_prefix}} Directory sync for {{provider_name}} is failing";

const SYNC_ERROR_BODY: &str = "\
Hello,

Directory sync for the identity provider \"{{provider_name}}\" ({{adapter}}) has failed \
{{failures}} times in a row.

Last error:

    {{last_sync_error}}

Last successful sync: {{last_synced_at}}
{{disabled_notice}}
Review the provider's settings at {{provider_url}}.
";

/// Named templates with `{{variable}}` placeholders.
pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
}

impl TemplateRenderer {
    /// A renderer with no templates.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// A renderer with the built-in templates registered.
    pub fn with_builtin() -> Self {
        let mut renderer = Self::new();
        renderer.register(Template {
            id: SYNC_ERROR_TEMPLATE.to_string(),
            subject: Some(SYNC_ERROR_SUBJECT.to_string()),
            body: SYNC_ERROR_BODY.to_string(),
            html_body: None,
        });
        renderer
    }

    /// Adds `template`, replacing one with the same id.
    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.get(template_id)
    }

    /// Fills every part of `template_id` from `data`.
    pub fn render(
        &self,
        template_id: &str,
        data: &HashMap<String, Value>,
    ) -> Result<RenderedContent, NotificationError> {
        let template = self
            .get(template_id)
            .ok_or_else(|| NotificationError::TemplateNotFound(template_id.to_string()))?;

        Ok(RenderedContent {
            subject: template.subject.as_deref().map(|s| fill(s, data)),
            body: fill(&template.body, data),
            html_body: template.html_body.as_deref().map(|s| fill(s, data)),
        })
    }
}

/// Substitutes `{{name}}` placeholders in one pass.
///
/// Unknown names and nulls render as nothing; an unterminated `{{` is kept
/// verbatim. Substituted values are not scanned again.
fn fill(template: &str, data: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        match data.get(after_open[..close].trim()) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.templates.keys().collect();
        ids.sort();
        f.debug_struct("TemplateRenderer").field("templates", &ids).finish()
    }
}
