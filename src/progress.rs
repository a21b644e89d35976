//! Benchmark progress reporting.
//!
//! Reports per-case progress during `kbh bench` so users see which case
//! is running and how it scored. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

use kb_harness_core::benchmark::{CaseObserver, EvaluationResult, NoopObserver, TestCase};

/// Human-friendly progress on stderr: `bench [3/17] EASY  What programming...`.
pub struct StderrProgress;

impl CaseObserver for StderrProgress {
    fn on_case_start(&mut self, index: usize, total: usize, case: &TestCase) {
        let line = format!(
            "bench [{}/{}] {:<6} {}\n",
            index,
            total,
            case.difficulty.as_str(),
            truncate(&case.query, 60)
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn on_case_done(&mut self, _index: usize, _total: usize, result: &EvaluationResult) {
        let line = format!(
            "      {} confidence {:.2}  {:.2}s\n",
            if result.is_correct { "✓" } else { "✗" },
            result.confidence_score,
            result.response_time
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CaseObserver for JsonProgress {
    fn on_case_start(&mut self, index: usize, total: usize, case: &TestCase) {
        let obj = serde_json::json!({
            "event": "case_start",
            "n": index,
            "total": total,
            "difficulty": case.difficulty,
            "query": case.query,
        });
        emit(&obj);
    }

    fn on_case_done(&mut self, index: usize, total: usize, result: &EvaluationResult) {
        let obj = serde_json::json!({
            "event": "case_done",
            "n": index,
            "total": total,
            "is_correct": result.is_correct,
            "confidence": result.confidence_score,
            "response_time": result.response_time,
        });
        emit(&obj);
    }
}

fn emit(obj: &serde_json::Value) {
    if let Ok(line) = serde_json::to_string(obj) {
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
        let _ = std::io::stderr().lock().flush();
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
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

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "auto" => Ok(Self::default_for_tty()),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, off, human, or json.",
                other
            ),
        }
    }

    /// Build an observer for this mode to pass to the benchmark harness.
    pub fn observer(&self) -> Box<dyn CaseObserver> {
        match self {
            ProgressMode::Off => Box::new(NoopObserver),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
