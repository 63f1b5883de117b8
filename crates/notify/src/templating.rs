//! Minijinja template rendering for quota notices.
//!
//! Notice subjects and bodies are templates rendered against a
//! [`NoticeContext`]. Built-in defaults cover both notice kinds; a
//! directory of `*.j2` files can override any of them.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::notice::{NoticeContext, NoticeKind};
use crate::traits::{Notification, NotifyError};

const WARNING_SUBJECT: &str =
    "[GPU quota] {{ subject_label }} has exceeded its high priority GPU quota";

const WARNING_BODY: &str = "\
Hello {{ subject_key }},

{{ subject_label }} is over its high priority GPU quota on {{ partitions }}.
If usage is still over quota {{ grace_hours }} hours from now, running and
pending jobs on {{ partitions }} will be cancelled automatically.

{{ report }}
{% if jobs %}
Active jobs:
{% for job in jobs %}  {{ job.job_id }}  {{ job.job_name }}  {{ job.user }}  {{ job.state | lower }}  {{ job.gpu_count }} GPU  started {{ job.start_time }}
{% endfor %}{% endif %}
Sent {{ timestamp }}
";

const CANCEL_SUBJECT: &str =
    "[GPU quota] cancelling high priority jobs for {{ subject_label }}";

const CANCEL_BODY: &str = "\
Hello {{ subject_key }},

{{ subject_label }} has been over its high priority GPU quota for more than
{{ grace_hours }} hours. The following jobs on {{ partitions }} are being cancelled:
{% for job in jobs %}  {{ job.job_id }}  {{ job.job_name }}  {{ job.user }}  {{ job.state | lower }}  {{ job.gpu_count }} GPU  started {{ job.start_time }}
{% else %}  (no active jobs)
{% endfor %}
{{ report }}

Sent {{ timestamp }}
";

/// Renders notice templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Subject and body templates for both notice kinds.
#[derive(Debug, Clone)]
pub struct NoticeTemplates {
    pub warning_subject: String,
    pub warning_body: String,
    pub cancel_subject: String,
    pub cancel_body: String,
}

impl Default for NoticeTemplates {
    fn default() -> Self {
        Self {
            warning_subject: WARNING_SUBJECT.to_string(),
            warning_body: WARNING_BODY.to_string(),
            cancel_subject: CANCEL_SUBJECT.to_string(),
            cancel_body: CANCEL_BODY.to_string(),
        }
    }
}

impl NoticeTemplates {
    /// Load overrides from `dir`.
    ///
    /// Recognised files are `warning_subject.j2`, `warning_body.j2`,
    /// `cancel_subject.j2` and `cancel_body.j2`; any that are missing keep
    /// the built-in default. Every loaded template is syntax-checked.
    pub fn from_dir(dir: &Path) -> Result<Self, NotifyError> {
        let mut templates = Self::default();
        let renderer = TemplateRenderer::new();

        let slots: [(&str, &mut String); 4] = [
            ("warning_subject.j2", &mut templates.warning_subject),
            ("warning_body.j2", &mut templates.warning_body),
            ("cancel_subject.j2", &mut templates.cancel_subject),
            ("cancel_body.j2", &mut templates.cancel_body),
        ];

        for (file, slot) in slots {
            let path = dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    renderer.validate(&source).map_err(|e| {
                        NotifyError::Config(format!("invalid template {}: {e}", path.display()))
                    })?;
                    tracing::debug!(path = %path.display(), "loaded notice template override");
                    *slot = source;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(NotifyError::Io(e)),
            }
        }

        Ok(templates)
    }

    /// Render a notice into a deliverable [`Notification`].
    pub fn render_notice(
        &self,
        renderer: &TemplateRenderer,
        ctx: &NoticeContext,
    ) -> Result<Notification, NotifyError> {
        let (subject_tpl, body_tpl) = match ctx.kind {
            NoticeKind::Warning => (&self.warning_subject, &self.warning_body),
            NoticeKind::Cancellation => (&self.cancel_subject, &self.cancel_body),
        };

        let subject = renderer.render(subject_tpl, ctx)?;
        let body = renderer.render(body_tpl, ctx)?;

        Ok(Notification {
            subject: subject.trim().to_string(),
            body,
            recipients: ctx.recipients.clone(),
            metadata: HashMap::from([
                ("kind".to_string(), ctx.kind.as_str().to_string()),
                ("subject".to_string(), ctx.subject_key.clone()),
            ]),
        })
    }
}
