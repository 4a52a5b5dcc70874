//! Structured-log capture into per-activity rings (§4.4).
//!
//! `CapturingLayer` is a `tracing_subscriber::Layer` that taps every event
//! flowing through the base logging pipeline and files it under whichever
//! activity's span produced it, without disturbing normal output — it never
//! swallows an event, only copies it.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::field::{Field, Visit};
use tracing::span::Attributes;
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use pbsflow_common::LogEntry;

/// Concurrent multimap of activity id (as rendered by `ActivityId::Display`)
/// to its append-only log ring.
#[derive(Clone, Default)]
pub struct LogCollector {
    entries: Arc<DashMap<String, Vec<LogEntry>>>,
}

impl LogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, activity_id: &str, entry: LogEntry) {
        self.entries.entry(activity_id.to_string()).or_default().push(entry);
    }

    pub fn logs_for(&self, activity_id: &str) -> Vec<LogEntry> {
        self.entries
            .get(activity_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

struct ActivityIdBinding(String);

/// Captures the `activity` field recorded on a span at creation time, e.g.
/// `tracing::info_span!("activity", activity = %id)`.
#[derive(Default)]
struct ActivityFieldVisitor(Option<String>);

impl Visit for ActivityFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "activity" {
            self.0 = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "activity" {
            self.0 = Some(value.to_string());
        }
    }
}

#[derive(Default)]
struct EventFieldVisitor {
    message: Option<String>,
    attributes: BTreeMap<String, serde_json::Value>,
}

impl Visit for EventFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered.trim_matches('"').to_string());
        } else {
            self.attributes
                .insert(field.name().to_string(), serde_json::Value::String(rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attributes
                .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.attributes
                .insert(field.name().to_string(), serde_json::Value::Number(number));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.attributes
            .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }
}

/// `tracing_subscriber::Layer` that mirrors events into a [`LogCollector`],
/// keyed by the `ActivityId` bound on the nearest enclosing span.
pub struct CapturingLayer {
    collector: LogCollector,
}

impl CapturingLayer {
    pub fn new(collector: LogCollector) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for CapturingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, _metadata: &tracing::Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        true
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = ActivityFieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(activity_id) = visitor.0
            && let Some(span) = ctx.span(id)
        {
            span.extensions_mut().insert(ActivityIdBinding(activity_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(activity_id) = ctx.event_scope(event).and_then(|scope| {
            scope
                .into_iter()
                .find_map(|span| span.extensions().get::<ActivityIdBinding>().map(|b| b.0.clone()))
        }) else {
            return;
        };

        let mut visitor = EventFieldVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            time: chrono::Utc::now(),
            level: event.metadata().level().to_string().to_lowercase(),
            message: visitor.message.unwrap_or_default(),
            attributes: visitor.attributes,
        };

        self.collector.append(&activity_id, entry);
    }
}
