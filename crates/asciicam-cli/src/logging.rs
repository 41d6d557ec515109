//! Tracing setup.
//!
//! Plain commands log to stderr. The TUI routes formatted lines to the logs panel
//! instead, so nothing is written over the alternate screen.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,asciicam=info,asciicam_client=info"))
}

pub(crate) fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Install the panel layer; returns the receiving end of the log lines.
pub(crate) fn init_panel() -> Receiver<String> {
    let (tx, rx) = unbounded();
    tracing_subscriber::registry()
        .with(env_filter())
        .with(PanelLayer::new(tx))
        .init();
    rx
}

pub(crate) struct PanelLayer {
    lines: Sender<String>,
}

impl PanelLayer {
    pub(crate) fn new(lines: Sender<String>) -> Self {
        Self { lines }
    }
}

impl<S> Layer<S> for PanelLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let _ = self.lines.send(visitor.into_line(event.metadata()));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl LineVisitor {
    fn into_line(self, meta: &tracing::Metadata<'_>) -> String {
        let mut line = format!(
            "{:>5} {}: {}",
            meta.level(),
            meta.target(),
            self.message.unwrap_or_default()
        );
        for field in self.fields {
            line.push(' ');
            line.push_str(&field);
        }
        line
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(formatted);
        } else {
            self.fields.push(format!("{}={}", field.name(), formatted));
        }
    }
}
