//! Index sync progress reporting.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! The human reporter is the default when stderr is a TTY; plumbing through
//! a trait keeps the sync pass testable with a silent reporter.

use std::io::Write;

/// A single progress event during a sync pass.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Walking the project tree. Total unknown.
    Scanning,
    /// Embedding changed files: n of total done, currently on `path`.
    Embedding { path: String, n: u64, total: u64 },
    /// Removing stale chunks for `paths` files.
    Cleaning { paths: u64 },
}

/// Reports sync progress. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress: "index  embedding  3 / 12  src/auth.rs".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Scanning => "index  scanning...\n".to_string(),
            IndexProgressEvent::Embedding { path, n, total } => {
                format!(
                    "index  embedding  {} / {}  {}\n",
                    format_number(*n),
                    format_number(*total),
                    path
                )
            }
            IndexProgressEvent::Cleaning { paths } => {
                format!("index  cleaning stale chunks for {} files\n", paths)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// No-op reporter for scripts and tests.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, or human-readable on stderr.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
        }
    }
}
