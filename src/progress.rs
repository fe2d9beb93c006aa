//! Progress reporting for `fod sketch`.
//!
//! Emitted on **stderr** so stdout stays parseable for scripts. One event is
//! reported per finished file job.

use std::io::Write;

/// How a sketch job ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Sketched,
    Unchanged,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Sketched => "sketched",
            JobStatus::Unchanged => "unchanged",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SketchProgressEvent {
    pub file: String,
    pub status: JobStatus,
    pub records: u64,
    /// Jobs finished so far, including this one.
    pub n: u64,
    pub total: u64,
}

pub trait SketchProgressReporter: Send + Sync {
    fn report(&self, event: SketchProgressEvent);
}

/// `sketch 3 / 12 files  parks.jsonl  sketched  1,234 records`
pub struct StderrProgress;

impl SketchProgressReporter for StderrProgress {
    fn report(&self, event: SketchProgressEvent) {
        let line = format!(
            "sketch {} / {} files  {}  {}  {} records\n",
            format_number(event.n),
            format_number(event.total),
            event.file,
            event.status.as_str(),
            format_number(event.records)
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl SketchProgressReporter for JsonProgress {
    fn report(&self, event: SketchProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "file": event.file,
            "status": event.status.as_str(),
            "records": event.records,
            "n": event.n,
            "total": event.total
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl SketchProgressReporter for NoProgress {
    fn report(&self, _event: SketchProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
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

    pub fn reporter(&self) -> Box<dyn SketchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
