//! Batch generation progress reporting.
//!
//! Reports what `pflow generate --all` is doing so users see which topic is
//! being generated, what was skipped and how many are left. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    /// The batch starts: `pending` of `total` topics need a remote call.
    Started { total: usize, pending: usize },
    /// Topic already had content or was in flight.
    Skipped { topic: String },
    /// A remote call for topic `n` of `pending` is about to be issued.
    Generating { topic: String, n: usize, pending: usize },
    Generated { topic: String },
    Failed { topic: String, error: String },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "generate  2 / 7  Scope of Supply".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Started { total, pending } => {
                format!("generate  {} topics, {} to generate\n", total, pending)
            }
            BatchProgressEvent::Skipped { topic } => format!("generate  skip  {}\n", topic),
            BatchProgressEvent::Generating { topic, n, pending } => {
                format!("generate  {} / {}  {}\n", n, pending, topic)
            }
            BatchProgressEvent::Generated { topic } => format!("generate  done  {}\n", topic),
            BatchProgressEvent::Failed { topic, error } => {
                format!("generate  FAILED  {}: {}\n", topic, error)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Started { total, pending } => serde_json::json!({
                "event": "started",
                "total": total,
                "pending": pending
            }),
            BatchProgressEvent::Skipped { topic } => serde_json::json!({
                "event": "skipped",
                "topic": topic
            }),
            BatchProgressEvent::Generating { topic, n, pending } => serde_json::json!({
                "event": "generating",
                "topic": topic,
                "n": n,
                "pending": pending
            }),
            BatchProgressEvent::Generated { topic } => serde_json::json!({
                "event": "generated",
                "topic": topic
            }),
            BatchProgressEvent::Failed { topic, error } => serde_json::json!({
                "event": "failed",
                "topic": topic,
                "error": error
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
