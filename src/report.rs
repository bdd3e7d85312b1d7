//! Reporters: consumers of the session's result-event stream.
//!
//! The core only emits structured [`ResultEvent`]s and a final [`Summary`];
//! rendering is a reporter concern. The console reporter prints one line per
//! event with a colored tag and a closing summary; the JSON reporter writes
//! one JSON object per line for machine consumption.

use std::io::Write;

use serde_json::json;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::model::{Outcome, ResultEvent, Summary};

/// Consumes the result stream. `event` is called in completion order;
/// `summary` exactly once, after the session closes.
pub trait Reporter {
    fn event(&mut self, event: &ResultEvent);
    fn summary(&mut self, summary: &Summary);
}

/// Discards everything. For embedders that consume the returned summary
/// directly.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn event(&mut self, _event: &ResultEvent) {}
    fn summary(&mut self, _summary: &Summary) {}
}

/// Captures the stream for inspection. Used by embedders and by the engine's
/// own tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<ResultEvent>,
    pub summary: Option<Summary>,
}

impl Reporter for RecordingReporter {
    fn event(&mut self, event: &ResultEvent) {
        self.events.push(event.clone());
    }

    fn summary(&mut self, summary: &Summary) {
        self.summary = Some(summary.clone());
    }
}

impl RecordingReporter {
    pub fn test_reports(&self) -> Vec<&crate::model::TestReport> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ResultEvent::Test(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// CONSOLE REPORTER
// ============================================================================

/// Human-readable console output: a tagged line per event, a failure recap,
/// and a one-line summary.
pub struct ConsoleReporter {
    out: StandardStream,
    failed: Vec<String>,
}

impl ConsoleReporter {
    /// Auto-detects color support on stdout.
    pub fn auto() -> Self {
        let choice = if atty::is(atty::Stream::Stdout) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self::with_color(choice)
    }

    pub fn with_color(choice: ColorChoice) -> Self {
        Self {
            out: StandardStream::stdout(choice),
            failed: Vec::new(),
        }
    }

    fn tag(&mut self, color: Color, text: &str) {
        let _ = self
            .out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.out, "{text}");
        let _ = self.out.reset();
    }

    fn line(&mut self, rest: &str) {
        let _ = writeln!(self.out, "{rest}");
    }
}

impl Reporter for ConsoleReporter {
    fn event(&mut self, event: &ResultEvent) {
        match event {
            ResultEvent::Test(report) => {
                match report.outcome {
                    Outcome::Passed => self.tag(Color::Green, "PASS"),
                    Outcome::Failed => self.tag(Color::Red, "FAIL"),
                    Outcome::Error => self.tag(Color::Red, "ERROR"),
                    Outcome::Skipped => self.tag(Color::Yellow, "SKIP"),
                    Outcome::Interrupted => self.tag(Color::Yellow, "INTERRUPTED"),
                }
                match &report.detail {
                    Some(detail) => self.line(&format!(": {} ({})", report.id, detail.message)),
                    None => self.line(&format!(": {}", report.id)),
                }
                if matches!(report.outcome, Outcome::Failed | Outcome::Error) {
                    self.failed.push(report.id.clone());
                }
            }
            ResultEvent::TeardownError { fixture, scope, message } => {
                self.tag(Color::Red, "TEARDOWN ERROR");
                self.line(&format!(": fixture `{fixture}` ({scope}): {message}"));
            }
            ResultEvent::HookError { point, handler, message } => {
                self.tag(Color::Red, "HOOK ERROR");
                self.line(&format!(": {handler} at {point}: {message}"));
            }
        }
    }

    fn summary(&mut self, summary: &Summary) {
        let _ = writeln!(self.out);
        let _ = write!(self.out, "Session summary: total {}, ", summary.total_tests());
        self.tag(Color::Green, "passed");
        let _ = write!(self.out, " {}, ", summary.passed);
        self.tag(Color::Red, "failed");
        let _ = write!(self.out, " {}, ", summary.failed);
        self.tag(Color::Red, "errors");
        let _ = write!(self.out, " {}, ", summary.errors);
        self.tag(Color::Yellow, "skipped");
        let _ = write!(self.out, " {}", summary.skipped);
        if summary.interrupted > 0 {
            let _ = write!(self.out, ", ");
            self.tag(Color::Yellow, "interrupted");
            let _ = write!(self.out, " {}", summary.interrupted);
        }
        let _ = writeln!(self.out);
        if summary.teardown_errors > 0 || summary.hook_errors > 0 {
            let _ = writeln!(
                self.out,
                "Non-test errors: {} teardown, {} hook",
                summary.teardown_errors, summary.hook_errors
            );
        }
        if !self.failed.is_empty() {
            let _ = writeln!(self.out, "\nFailed tests:");
            let failed = std::mem::take(&mut self.failed);
            for id in failed {
                let _ = writeln!(self.out, "  - {id}");
            }
        }
    }
}

// ============================================================================
// JSON REPORTER
// ============================================================================

/// One JSON object per line: each result event as serialized, then a final
/// `{"event":"summary", ...}` record.
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl JsonReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: std::io::stdout(),
        }
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn event(&mut self, event: &ResultEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(self.writer, "{line}");
        }
    }

    fn summary(&mut self, summary: &Summary) {
        let record = json!({ "event": "summary", "summary": summary });
        let _ = writeln!(self.writer, "{record}");
    }
}
