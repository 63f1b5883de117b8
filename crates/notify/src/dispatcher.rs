//! Renders notices and routes them to every configured channel.
//!
//! Individual channel failures don't block other channels.

use crate::notice::NoticeContext;
use crate::templating::{NoticeTemplates, TemplateRenderer};
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

/// Fans notices out to a fixed set of channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
    templates: NoticeTemplates,
    renderer: TemplateRenderer,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>, templates: NoticeTemplates) -> Self {
        Self {
            channels,
            templates,
            renderer: TemplateRenderer::new(),
        }
    }

    /// Dispatcher with no channels; notices are rendered, then refused.
    pub fn empty() -> Self {
        Self::new(Vec::new(), NoticeTemplates::default())
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver an already-rendered notification to every channel.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let subject_key = notification
            .metadata
            .get("subject")
            .cloned()
            .unwrap_or_default();

        if self.channels.is_empty() {
            tracing::debug!(subject = %subject_key, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        subject = %subject_key,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notice delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        subject = %subject_key,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notice delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                subject_key: subject_key.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }

    /// Render a notice and deliver it.
    ///
    /// Fails if rendering fails, if there is no channel to deliver to, or
    /// if every channel failed. Partial delivery counts as success.
    pub async fn notify(&self, ctx: &NoticeContext) -> Result<Vec<DispatchResult>, NotifyError> {
        let notification = self.templates.render_notice(&self.renderer, ctx)?;
        if self.channels.is_empty() {
            tracing::debug!(
                subject = %ctx.subject_key,
                title = %notification.subject,
                "Notice rendered, no channel to send it"
            );
            return Err(NotifyError::NoChannels);
        }

        let results = self.dispatch(&notification).await;
        if results.iter().all(|r| !r.success) {
            let errors: Vec<String> = results
                .iter()
                .map(|r| format!("{}: {}", r.channel, r.error.as_deref().unwrap_or("unknown")))
                .collect();
            return Err(NotifyError::Undelivered(errors.join("; ")));
        }

        Ok(results)
    }
}
