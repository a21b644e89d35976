//! Benchmark harness for answering systems.
//!
//! A [`BenchmarkHarness`] owns a list of labeled [`TestCase`]s and runs any
//! [`AnswerSystem`] through them one at a time, scoring every answer with
//! the lexical rules in [`scoring`] and aggregating a [`BenchmarkReport`].
//!
//! # Failure handling
//!
//! | Error from the system | Outcome |
//! |-----------------------|---------|
//! | [`HarnessError::Configuration`] | the run aborts |
//! | anything else | the case is recorded as incorrect, confidence `0.0`, the error in `notes` |
//!
//! Cases run strictly in order; case `i + 1` starts only after case `i`
//! has been recorded, so each response time is measured in isolation.

pub mod cases;
pub mod report;
pub mod scoring;

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{HarnessError, Result};

pub use report::{
    generate_report, render_comparison, render_report, BenchmarkReport, DetailedResults,
    EvaluationMetadata, FRAMEWORK_VERSION,
};
pub use scoring::{extract_key_terms, score_answer, Score, STOP_WORDS};

/// How hard a test case is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Every level, in report order.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    /// Minimum confidence for an answer to count as correct. Hard cases
    /// get a lower bar since good answers are less literal.
    pub fn threshold(&self) -> f64 {
        match self {
            Difficulty::Hard => 0.5,
            Difficulty::Easy | Difficulty::Medium => 0.6,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a wrong answer to a test case matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

/// A labeled question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub query: String,
    pub expected_answer: String,
    pub ground_truth_location: String,
    pub difficulty: Difficulty,
    pub importance: Importance,
    pub category: String,
    #[serde(default)]
    pub requires_reasoning: Option<String>,
    #[serde(default)]
    pub why_hard: Option<String>,
}

impl TestCase {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("query", &self.query),
            ("expected_answer", &self.expected_answer),
            ("ground_truth_location", &self.ground_truth_location),
            ("category", &self.category),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(HarnessError::validation(format!(
                    "test case '{}' is missing required field: {}",
                    self.query, field
                )));
            }
        }
        Ok(())
    }
}

/// The scored outcome of one test case in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: String,
    pub expected_answer: String,
    pub actual_answer: String,
    pub is_correct: bool,
    pub confidence_score: f64,
    /// Seconds spent waiting for the answer; `0.0` when the call failed.
    pub response_time: f64,
    pub difficulty: Difficulty,
    pub category: String,
    #[serde(default, alias = "evaluation_notes")]
    pub notes: String,
}

/// What a system under test returns for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResult {
    pub answer: String,
    /// Optional structured payload (retrieved context, evidence, ...).
    pub details: Option<Value>,
}

impl AnswerResult {
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            details: None,
        }
    }

    /// Accept either a JSON string or an object with a string `answer`
    /// field. Any other shape is a configuration error.
    pub fn from_json(value: Value) -> Result<Self> {
        if let Value::String(answer) = &value {
            return Ok(Self::text(answer.clone()));
        }
        let Some(map) = value.as_object() else {
            return Err(HarnessError::Configuration(format!(
                "expected an answer string or object, got {}",
                json_kind(&value)
            )));
        };
        match map.get("answer") {
            Some(Value::String(answer)) => Ok(Self {
                answer: answer.clone(),
                details: Some(value.clone()),
            }),
            _ => Err(HarnessError::Configuration(
                "answer object has no string 'answer' field".into(),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A system that can be benchmarked.
#[async_trait]
pub trait AnswerSystem: Send + Sync {
    fn name(&self) -> &str;
    async fn answer(&self, query: &str) -> Result<AnswerResult>;
}

/// Progress hooks called around every case.
pub trait CaseObserver {
    fn on_case_start(&mut self, _index: usize, _total: usize, _case: &TestCase) {}
    fn on_case_done(&mut self, _index: usize, _total: usize, _result: &EvaluationResult) {}
}

/// Observer that does nothing.
pub struct NoopObserver;

impl CaseObserver for NoopObserver {}

/// Results and report of one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRun {
    pub results: Vec<EvaluationResult>,
    pub report: BenchmarkReport,
}

/// Owns the test cases and drives systems through them.
#[derive(Debug, Clone)]
pub struct BenchmarkHarness {
    cases: Vec<TestCase>,
}

impl BenchmarkHarness {
    /// Build a harness from custom cases. Cases must be valid and their
    /// queries unique, since results are matched back to cases by query.
    pub fn new(cases: Vec<TestCase>) -> Result<Self> {
        if cases.is_empty() {
            return Err(HarnessError::validation("a benchmark needs at least one test case"));
        }
        let mut seen = HashSet::new();
        for case in &cases {
            case.validate()?;
            if !seen.insert(case.query.as_str()) {
                return Err(HarnessError::validation(format!(
                    "duplicate test case query: {}",
                    case.query
                )));
            }
        }
        Ok(Self { cases })
    }

    /// The built-in documentation benchmark.
    pub fn with_default_cases() -> Self {
        Self {
            cases: cases::default_cases(),
        }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// A harness over the first `n` cases (at least one).
    pub fn quick(&self, n: usize) -> Self {
        let n = n.clamp(1, self.cases.len().max(1));
        Self {
            cases: self.cases.iter().take(n).cloned().collect(),
        }
    }

    /// Run every case against `system` and aggregate a report.
    pub async fn evaluate(&self, system: &dyn AnswerSystem) -> Result<BenchmarkRun> {
        self.evaluate_observed(system, &mut NoopObserver).await
    }

    pub async fn evaluate_observed(
        &self,
        system: &dyn AnswerSystem,
        observer: &mut dyn CaseObserver,
    ) -> Result<BenchmarkRun> {
        let total = self.cases.len();
        info!(
            system = system.name(),
            cases = total,
            "Starting benchmark evaluation"
        );
        let run_start = Instant::now();
        let mut results = Vec::with_capacity(total);

        for (i, case) in self.cases.iter().enumerate() {
            let index = i + 1;
            observer.on_case_start(index, total, case);
            info!(
                "Evaluating case {}/{}: {} - {}",
                index,
                total,
                case.difficulty,
                preview(&case.query, 50)
            );

            let started = Instant::now();
            let outcome = system.answer(&case.query).await;
            let elapsed = started.elapsed().as_secs_f64();

            let result = match outcome {
                Ok(answer) => {
                    let score = score_answer(&case.expected_answer, &answer.answer, case.difficulty);
                    info!(
                        "  {} {} | Confidence: {:.2} | Time: {:.2}s",
                        if score.is_correct { "✓" } else { "✗" },
                        case.difficulty,
                        score.confidence,
                        elapsed
                    );
                    if !score.is_correct && case.importance == Importance::Critical {
                        warn!("  CRITICAL MISS: {}", case.query);
                    }
                    EvaluationResult {
                        query: case.query.clone(),
                        expected_answer: case.expected_answer.clone(),
                        actual_answer: answer.answer,
                        is_correct: score.is_correct,
                        confidence_score: score.confidence,
                        response_time: elapsed,
                        difficulty: case.difficulty,
                        category: case.category.clone(),
                        notes: score.notes(),
                    }
                }
                Err(e) if e.is_configuration() => {
                    error!("  System under test is misconfigured: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("  ERROR evaluating case {}: {}", index, e);
                    EvaluationResult {
                        query: case.query.clone(),
                        expected_answer: case.expected_answer.clone(),
                        actual_answer: format!("ERROR: {}", e),
                        is_correct: false,
                        confidence_score: 0.0,
                        response_time: 0.0,
                        difficulty: case.difficulty,
                        category: case.category.clone(),
                        notes: format!("System error: {}", e),
                    }
                }
            };

            observer.on_case_done(index, total, &result);
            results.push(result);
        }

        info!(
            "Evaluation completed in {:.2}s",
            run_start.elapsed().as_secs_f64()
        );

        let report = generate_report(&results, &self.cases, system.name(), Utc::now().to_rfc3339());
        Ok(BenchmarkRun { results, report })
    }

    /// Package a run's results with this harness's cases for persistence.
    pub fn detailed_results(&self, run: &BenchmarkRun) -> DetailedResults {
        DetailedResults::new(
            run.report.evaluation_timestamp.clone(),
            Some(run.report.system_name.clone()),
            run.results.clone(),
            self.cases.clone(),
        )
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}
