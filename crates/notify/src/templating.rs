//! Minijinja template rendering for alert messages.
//!
//! Templates see the fields of [`TemplateContext`]; times are RFC 3339 UTC
//! strings so that `{{ start_time }}` reads the same in every channel.

use chrono::SecondsFormat;

use ccp_core::{Event, TransitionKind};

use crate::traits::NotifyError;

/// Values available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub event_name: String,
    pub event_id: String,
    pub tag_id: String,
    pub rule_id: String,
    pub severity: String,
    pub status: String,
    /// `"opened"` or `"resolved"`.
    pub transition: String,
    /// RFC 3339, UTC.
    pub start_time: String,
    pub end_time: Option<String>,
    pub annotation: Option<String>,
}

impl TemplateContext {
    pub fn new(event: &Event, kind: TransitionKind) -> Self {
        let fmt = |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            event_name: event.event_name.clone(),
            event_id: event.event_id.clone(),
            tag_id: event.tag_id.clone(),
            rule_id: event.rule_id.clone(),
            severity: event.severity.to_string(),
            status: event.status.to_string(),
            transition: kind.to_string(),
            start_time: fmt(event.start_time),
            end_time: event.end_time.map(fmt),
            annotation: event.annotation.clone(),
        }
    }
}

/// Shared minijinja environment for alert templates.
///
/// Subject and body templates are plain strings owned by the dispatcher, so
/// they are compiled on each render rather than registered by name.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: minijinja::Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = minijinja::Environment::new();
        // Undefined variables are template bugs, not blanks.
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render `template` against `ctx`.
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        self.env
            .render_str(template, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Parse `template` without rendering it.
    pub fn validate(&self, template: &str) -> Result<(), NotifyError> {
        self.env
            .template_from_str(template)
            .map(drop)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccp_core::Severity;
    use chrono::{TimeZone, Utc};

    fn sample_context() -> TemplateContext {
        let start = Utc.with_ymd_and_hms(2023, 5, 24, 12, 0, 0).unwrap();
        let mut event = Event::candidate("OZ-PROD-ERR", "ozone-process", "Ozone Process", Severity::Critical, start);
        event.resolve(start + chrono::Duration::minutes(20), None);
        TemplateContext::new(&event, TransitionKind::Resolved)
    }

    #[test]
    fn render_basic_template() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("{{ event_name }} event resolved", &sample_context())
            .unwrap();
        assert_eq!(result, "Ozone Process event resolved");
    }

    #[test]
    fn render_times_and_filters() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();
        let result = renderer
            .render("[{{ severity | upper }}] {{ start_time }} .. {{ end_time }}", &ctx)
            .unwrap();
        assert_eq!(result, "[CRITICAL] 2023-05-24T12:00:00Z .. 2023-05-24T12:20:00Z");
    }

    #[test]
    fn render_optional_fields() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();
        let result = renderer
            .render("{% if annotation %}({{ annotation }}){% else %}-{% endif %}", &ctx)
            .unwrap();
        assert_eq!(result, "-");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.render("{{ plant_name }}", &sample_context()).is_err());
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("{{ unclosed", &sample_context());
        match result {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
        assert!(renderer.validate("{{ unclosed").is_err());
        assert!(renderer.validate("{{ event_name }}").is_ok());
    }
}
