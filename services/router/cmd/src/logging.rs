use std::fmt::{self, Write as _};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// ANSI color codes for console output
const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

/// Column widths for alignment
const SOURCE_WIDTH: usize = 16;
const LOG_LEVEL_WIDTH: usize = 7;

/// Formatter printing `[timestamp] [node/component] [LEVEL] message key=value...`
pub struct RouterLogFormatter {
    service_name: String,
    color_enabled: bool,
}

/// Log at info level tagged with a component
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log at warn level tagged with a component
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

impl RouterLogFormatter {
    pub fn new(service_name: String) -> Self {
        Self {
            service_name,
            color_enabled: is_terminal(),
        }
    }

    #[cfg(test)]
    fn plain(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            color_enabled: false,
        }
    }

    /// `node/component` with a fixed width
    fn format_source(&self, node: Option<&str>, component: Option<&str>) -> String {
        let node = node.unwrap_or(&self.service_name);
        let name = match component {
            Some(comp) => format!("{node}/{comp}"),
            None => node.to_string(),
        };

        if name.chars().count() > SOURCE_WIDTH {
            let truncated: String = name.chars().take(SOURCE_WIDTH - 1).collect();
            format!("{truncated}…")
        } else {
            format!("{:<width$}", name, width = SOURCE_WIDTH)
        }
    }

    fn format_log_level(&self, level: &tracing::Level) -> String {
        let level_str = match *level {
            tracing::Level::ERROR => "✗ ERROR",
            tracing::Level::WARN => "⚠ WARN",
            tracing::Level::INFO => "ℹ INFO",
            tracing::Level::DEBUG => "◦ DEBUG",
            tracing::Level::TRACE => "◦ TRACE",
        };

        format!("{:<width$}", level_str, width = LOG_LEVEL_WIDTH + 2)
    }

    fn get_color_for_level(&self, level: &tracing::Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }

        match *level {
            tracing::Level::ERROR => COLOR_BRIGHT_RED,
            tracing::Level::WARN => COLOR_BRIGHT_YELLOW,
            tracing::Level::INFO => COLOR_GREEN,
            tracing::Level::DEBUG | tracing::Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn format_line(&self, timestamp: &str, level: &tracing::Level, fields: &FieldVisitor) -> String {
        let color = self.get_color_for_level(level);
        let (reset, cyan) = if self.color_enabled {
            (COLOR_RESET, COLOR_CYAN)
        } else {
            ("", "")
        };

        let mut line = format!(
            "{}[{}] [{}] [{}{}{}] {}",
            cyan,
            timestamp,
            self.format_source(fields.node.as_deref(), fields.component.as_deref()),
            color,
            self.format_log_level(level),
            reset,
            fields.message
        );
        for (key, value) in &fields.extra {
            let _ = write!(line, " {key}={value}");
        }
        line.push_str(reset);
        line
    }
}

impl<S, N> FormatEvent<S, N> for RouterLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        writeln!(writer, "{}", self.format_line(&timestamp, event.metadata().level(), &visitor))
    }
}

/// Collects the message, the `node`/`component` columns and any other fields
#[derive(Default)]
struct FieldVisitor {
    message: String,
    node: Option<String>,
    component: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn record_value(&mut self, name: &'static str, value: String) {
        match name {
            "message" => self.message = value,
            "node" => self.node = Some(value),
            "component" => self.component = Some(value),
            _ => self.extra.push((name, value)),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let mut text = format!("{:?}", value);
        // Strip quotes from debug-formatted strings
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text = text[1..text.len() - 1].to_string();
        }
        self.record_value(field.name(), text);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_value(field.name(), value.to_string());
    }
}

/// Check if we're outputting to a terminal (for color support)
fn is_terminal() -> bool {
    use std::io::IsTerminal;

    std::env::var("TERM").map_or(false, |term| term != "dumb") && std::io::stderr().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_column() {
        let formatter = RouterLogFormatter::plain("router");

        assert_eq!(formatter.format_source(None, None).trim_end(), "router");
        assert_eq!(formatter.format_source(Some("A"), Some("config")).trim_end(), "A/config");
        assert_eq!(formatter.format_source(Some("A"), None).len(), SOURCE_WIDTH);

        let long = formatter.format_source(Some("a-very-long-node-name"), Some("session"));
        assert_eq!(long.chars().count(), SOURCE_WIDTH);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_line_layout() {
        let formatter = RouterLogFormatter::plain("router");
        let fields = FieldVisitor {
            message: "Forwarding message".to_string(),
            node: Some("B".to_string()),
            component: None,
            extra: vec![("dst", "D".to_string()), ("next_hop", "C".to_string())],
        };

        let line = formatter.format_line("2024-01-01 00:00:00.000", &tracing::Level::DEBUG, &fields);
        assert!(line.starts_with("[2024-01-01 00:00:00.000] [B "));
        assert!(line.contains("] [◦ DEBUG  ] Forwarding message dst=D next_hop=C"));
        assert!(!line.contains('\x1b'));
    }
}
