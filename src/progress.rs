//! Scan progress reporting.
//!
//! Reports observable progress during a crawl so users see which path is
//! being explored and how far along the budget the scan is. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.
//!
//! Reporting is notification only; nothing in the scan depends on it.

use std::io::Write;

/// A single progress event for a scan.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanProgressEvent {
    /// Probing the repository root. Total unknown.
    Discovering { repository: String },
    /// Working through candidate paths. `percent` never decreases.
    Exploring {
        path: String,
        percent: u8,
        files_processed: usize,
    },
    /// Scan finished (including cancelled scans).
    Complete {
        files_processed: usize,
        paths_attempted: usize,
    },
}

/// Reports scan progress. Implementations write to stderr (human or JSON).
pub trait ScanProgressReporter: Send + Sync {
    fn report(&self, event: ScanProgressEvent);
}

/// Human-friendly progress on stderr: "scan  42%  src/api  (17 files)".
pub struct StderrProgress;

impl ScanProgressReporter for StderrProgress {
    fn report(&self, event: ScanProgressEvent) {
        let line = match &event {
            ScanProgressEvent::Discovering { repository } => {
                format!("scan {}  discovering...\n", repository)
            }
            ScanProgressEvent::Exploring {
                path,
                percent,
                files_processed,
            } => {
                let shown = if path.is_empty() { "/" } else { path.as_str() };
                format!(
                    "scan {:>3}%  {}  ({} files)\n",
                    percent,
                    shown,
                    format_number(*files_processed as u64)
                )
            }
            ScanProgressEvent::Complete {
                files_processed,
                paths_attempted,
            } => format!(
                "scan 100%  done  {} files from {} paths\n",
                format_number(*files_processed as u64),
                format_number(*paths_attempted as u64)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScanProgressReporter for JsonProgress {
    fn report(&self, event: ScanProgressEvent) {
        let obj = match &event {
            ScanProgressEvent::Discovering { repository } => serde_json::json!({
                "event": "progress",
                "repository": repository,
                "phase": "discovering"
            }),
            ScanProgressEvent::Exploring {
                path,
                percent,
                files_processed,
            } => serde_json::json!({
                "event": "progress",
                "phase": "exploring",
                "path": path,
                "percent": percent,
                "files_processed": files_processed
            }),
            ScanProgressEvent::Complete {
                files_processed,
                paths_attempted,
            } => serde_json::json!({
                "event": "progress",
                "phase": "complete",
                "percent": 100,
                "files_processed": files_processed,
                "paths_attempted": paths_attempted
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ScanProgressReporter for NoProgress {
    fn report(&self, _event: ScanProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
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

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn ScanProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
