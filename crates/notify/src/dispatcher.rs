//! Routes alerts for event transitions to every configured channel.
//!
//! The dispatcher renders the subject and body once per transition, then
//! delivers to each channel in turn. Individual channel failures are logged
//! and don't block other channels; nothing here ever fails the caller.

use std::collections::BTreeMap;

use ccp_core::{Event, TransitionKind};

use crate::templating::{TemplateContext, TemplateRenderer};
use crate::traits::{Alert, DispatchResult, Notifier, NotifyError};

/// Subject and body templates per transition kind.
#[derive(Debug, Clone)]
pub struct AlertTemplates {
    pub opened_subject: String,
    pub opened_body: String,
    pub resolved_subject: String,
    pub resolved_body: String,
}

impl Default for AlertTemplates {
    fn default() -> Self {
        Self {
            opened_subject: "{{ event_name }} event is occurring, take action!".to_string(),
            opened_body: "{{ event_name }} on {{ tag_id }} (rule {{ rule_id }}, {{ severity }}) \
                          active since {{ start_time }}."
                .to_string(),
            resolved_subject: "{{ event_name }} event resolved".to_string(),
            resolved_body: "{{ event_name }} on {{ tag_id }} (rule {{ rule_id }}) \
                            ran from {{ start_time }} to {{ end_time }}\
                            {% if annotation %} ({{ annotation }}){% endif %}."
                .to_string(),
        }
    }
}

impl AlertTemplates {
    fn for_kind(&self, kind: TransitionKind) -> (&str, &str) {
        match kind {
            TransitionKind::Opened => (self.opened_subject.as_str(), self.opened_body.as_str()),
            TransitionKind::Resolved => {
                (self.resolved_subject.as_str(), self.resolved_body.as_str())
            }
        }
    }
}

/// Dispatches alerts to a fixed set of channels.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn Notifier>>,
    templates: AlertTemplates,
    renderer: TemplateRenderer,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            channels,
            templates: AlertTemplates::default(),
            renderer: TemplateRenderer::new(),
        }
    }

    /// A dispatcher that drops every alert.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Replace the templates, checking their syntax first.
    pub fn with_templates(mut self, templates: AlertTemplates) -> Result<Self, NotifyError> {
        for t in [
            &templates.opened_subject,
            &templates.opened_body,
            &templates.resolved_subject,
            &templates.resolved_body,
        ] {
            self.renderer.validate(t)?;
        }
        self.templates = templates;
        Ok(self)
    }

    pub fn add_channel(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Build the alert for `event` entering `kind`.
    pub fn render(&self, event: &Event, kind: TransitionKind) -> Result<Alert, NotifyError> {
        let ctx = TemplateContext::new(event, kind);
        let (subject_tpl, body_tpl) = self.templates.for_kind(kind);
        let at = match kind {
            TransitionKind::Opened => event.last_seen_or_start(),
            TransitionKind::Resolved => event.end_time.unwrap_or(event.start_time),
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("tag_id".to_string(), event.tag_id.clone());
        metadata.insert("rule_id".to_string(), event.rule_id.clone());
        metadata.insert("event_name".to_string(), event.event_name.clone());
        if let Some(annotation) = &event.annotation {
            metadata.insert("annotation".to_string(), annotation.clone());
        }
        Ok(Alert {
            subject: self.renderer.render(subject_tpl, &ctx)?,
            body: self.renderer.render(body_tpl, &ctx)?,
            transition: kind,
            severity: event.severity,
            event_id: event.event_id.clone(),
            at,
            metadata,
        })
    }

    /// Deliver one alert for `event` entering `kind` to every channel.
    ///
    /// Returns a result per channel; an empty vector when rendering failed
    /// or no channel is configured.
    pub async fn notify(&self, event: &Event, kind: TransitionKind) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!(event_id = %event.event_id, "No alert channels configured");
            return Vec::new();
        }

        let alert = match self.render(event, kind) {
            Ok(alert) => alert,
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    transition = %kind,
                    error = %e,
                    "Alert rendering failed"
                );
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(&alert).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        event_id = %alert.event_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Alert delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %alert.event_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Alert delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                event_id: alert.event_id.clone(),
                success,
                error,
                duration_ms,
            });
        }
        results
    }
}
