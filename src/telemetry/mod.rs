use crate::classify::ClassifiedError;
use crate::event_bus::HarnessEvent;

pub mod http;
pub mod projections;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &HarnessEvent) -> EventRender;
    fn render_errors(&self, errors: &[ClassifiedError]) -> Vec<EventRender>;
}

pub struct PlainFormatter;

impl PlainFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &HarnessEvent) -> EventRender {
        let line = format!("{LINE_COLOR}{}{RESET_COLOR}\n", event);
        EventRender {
            context: Some(event.name().to_string()),
            lines: vec![line],
        }
    }

    fn render_errors(&self, errors: &[ClassifiedError]) -> Vec<EventRender> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = Vec::new();
                let category_str =
                    format!("{CONTEXT_COLOR}{}{RESET_COLOR}", e.classification.category);
                lines.push(format!("[{}] {} | {}\n", i, e.when, category_str));
                lines.push(format!(
                    "{LINE_COLOR}  error: {}{RESET_COLOR}\n",
                    e.classification.human_message
                ));
                if !e.tags.is_empty() {
                    lines.push(format!("{LINE_COLOR}  tags: {:?}{RESET_COLOR}\n", e.tags));
                }
                if !e.context.is_null() {
                    lines.push(format!(
                        "{LINE_COLOR}  context: {}{RESET_COLOR}\n",
                        e.context
                    ));
                }
                EventRender {
                    context: Some(e.classification.category.to_string()),
                    lines,
                }
            })
            .collect()
    }
}
