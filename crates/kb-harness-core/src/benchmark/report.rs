//! Report aggregation, rendering, and the detailed results file format.
//!
//! [`generate_report`] is a pure function of its inputs: the same results,
//! cases, name and timestamp always produce the same [`BenchmarkReport`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{Difficulty, EvaluationResult, Importance, TestCase};
use crate::error::{HarnessError, Result};

/// Version tag written into every detailed results file.
pub const FRAMEWORK_VERSION: &str = "1.0";

/// Aggregate view of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub system_name: String,
    pub total_cases: usize,
    pub correct_answers: usize,
    pub overall_accuracy: f64,
    /// Always holds `EASY`, `MEDIUM` and `HARD`; levels without cases are `0.0`.
    pub accuracy_by_difficulty: BTreeMap<String, f64>,
    pub accuracy_by_category: BTreeMap<String, f64>,
    /// Mean over cases with a positive response time.
    pub avg_response_time: f64,
    pub response_time_by_difficulty: BTreeMap<String, f64>,
    /// Queries of CRITICAL cases answered incorrectly, in case order.
    pub critical_misses: Vec<String>,
    pub evaluation_timestamp: String,
}

fn ratio(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

fn mean_positive<'a>(times: impl Iterator<Item = &'a f64>) -> f64 {
    let positive: Vec<f64> = times.copied().filter(|t| *t > 0.0).collect();
    if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    }
}

/// Aggregate a run's results.
///
/// `cases` supplies importance: a critical miss is a CRITICAL case whose
/// result (matched by query) is incorrect. Cases without a result are not
/// misses.
pub fn generate_report(
    results: &[EvaluationResult],
    cases: &[TestCase],
    system_name: &str,
    timestamp: String,
) -> BenchmarkReport {
    let total_cases = results.len();
    let correct_answers = results.iter().filter(|r| r.is_correct).count();

    let mut accuracy_by_difficulty = BTreeMap::new();
    let mut response_time_by_difficulty = BTreeMap::new();
    for difficulty in Difficulty::ALL {
        let level: Vec<&EvaluationResult> =
            results.iter().filter(|r| r.difficulty == difficulty).collect();
        let correct = level.iter().filter(|r| r.is_correct).count();
        accuracy_by_difficulty.insert(difficulty.as_str().to_string(), ratio(correct, level.len()));
        response_time_by_difficulty.insert(
            difficulty.as_str().to_string(),
            mean_positive(level.iter().map(|r| &r.response_time)),
        );
    }

    let mut category_counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for r in results {
        let entry = category_counts.entry(r.category.as_str()).or_default();
        entry.1 += 1;
        if r.is_correct {
            entry.0 += 1;
        }
    }
    let accuracy_by_category = category_counts
        .into_iter()
        .map(|(category, (correct, total))| (category.to_string(), ratio(correct, total)))
        .collect();

    let critical_misses = cases
        .iter()
        .filter(|c| c.importance == Importance::Critical)
        .filter(|c| {
            results
                .iter()
                .find(|r| r.query == c.query)
                .is_some_and(|r| !r.is_correct)
        })
        .map(|c| c.query.clone())
        .collect();

    BenchmarkReport {
        system_name: system_name.to_string(),
        total_cases,
        correct_answers,
        overall_accuracy: ratio(correct_answers, total_cases),
        accuracy_by_difficulty,
        accuracy_by_category,
        avg_response_time: mean_positive(results.iter().map(|r| &r.response_time)),
        response_time_by_difficulty,
        critical_misses,
        evaluation_timestamp: timestamp,
    }
}

fn marker(accuracy: f64) -> &'static str {
    if accuracy > 0.8 {
        "✓"
    } else if accuracy > 0.5 {
        "⚠"
    } else {
        "✗"
    }
}

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn level(map: &BTreeMap<String, f64>, difficulty: Difficulty) -> f64 {
    map.get(difficulty.as_str()).copied().unwrap_or(0.0)
}

/// Render a report as plain text.
pub fn render_report(report: &BenchmarkReport) -> String {
    let rule = "=".repeat(80);
    let thin = "-".repeat(40);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "RAG SYSTEM BENCHMARK REPORT - {}", report.system_name);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Evaluation Date: {}", report.evaluation_timestamp);
    let _ = writeln!(out, "Total Test Cases: {}", report.total_cases);
    let _ = writeln!(out);

    let _ = writeln!(out, "OVERALL PERFORMANCE");
    let _ = writeln!(out, "{}", thin);
    let _ = writeln!(
        out,
        "Accuracy: {} ({}/{})",
        pct(report.overall_accuracy),
        report.correct_answers,
        report.total_cases
    );
    let _ = writeln!(out, "Average Response Time: {:.2}s", report.avg_response_time);
    let _ = writeln!(out);

    let _ = writeln!(out, "ACCURACY BY DIFFICULTY");
    let _ = writeln!(out, "{}", thin);
    for difficulty in Difficulty::ALL {
        let accuracy = level(&report.accuracy_by_difficulty, difficulty);
        let _ = writeln!(
            out,
            "{} {:6}: {}",
            marker(accuracy),
            difficulty.as_str(),
            pct(accuracy)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "RESPONSE TIME BY DIFFICULTY");
    let _ = writeln!(out, "{}", thin);
    for difficulty in Difficulty::ALL {
        let _ = writeln!(
            out,
            "  {:6}: {:.2}s",
            difficulty.as_str(),
            level(&report.response_time_by_difficulty, difficulty)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "ACCURACY BY CATEGORY");
    let _ = writeln!(out, "{}", thin);
    let mut categories: Vec<(&String, &f64)> = report.accuracy_by_category.iter().collect();
    categories.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    for (category, accuracy) in categories {
        let _ = writeln!(out, "{} {:20}: {}", marker(*accuracy), category, pct(*accuracy));
    }
    let _ = writeln!(out);

    if report.critical_misses.is_empty() {
        let _ = writeln!(out, "NO CRITICAL MISSES");
    } else {
        let _ = writeln!(out, "CRITICAL MISSES");
        let _ = writeln!(out, "{}", thin);
        for miss in &report.critical_misses {
            let _ = writeln!(out, "✗ {}", miss);
        }
    }

    out
}

fn improvement(candidate: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        (candidate - baseline) / baseline * 100.0
    } else {
        0.0
    }
}

/// Render a side-by-side comparison of two runs.
pub fn render_comparison(candidate: &BenchmarkReport, baseline: &BenchmarkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<25} | {:<15} | {:<15} | {:<15}",
        "Metric", "Advanced", "Baseline", "Improvement"
    );
    let _ = writeln!(out, "{}", "-".repeat(75));

    let _ = writeln!(
        out,
        "{:<25} | {:<15} | {:<15} | {:+.1}%",
        "Overall Accuracy",
        pct(candidate.overall_accuracy),
        pct(baseline.overall_accuracy),
        improvement(candidate.overall_accuracy, baseline.overall_accuracy)
    );

    for difficulty in Difficulty::ALL {
        let a = level(&candidate.accuracy_by_difficulty, difficulty);
        let b = level(&baseline.accuracy_by_difficulty, difficulty);
        let _ = writeln!(
            out,
            "{:<25} | {:<15} | {:<15} | {:+.1}%",
            format!("{} Queries", difficulty.as_str()),
            pct(a),
            pct(b),
            improvement(a, b)
        );
    }

    let _ = writeln!(
        out,
        "{:<25} | {:<15} | {:<15} | {:+.0}%",
        "Avg Response Time",
        format!("{:.2}s", candidate.avg_response_time),
        format!("{:.2}s", baseline.avg_response_time),
        improvement(candidate.avg_response_time, baseline.avg_response_time)
    );

    let a = candidate.critical_misses.len() as i64;
    let b = baseline.critical_misses.len() as i64;
    let _ = writeln!(
        out,
        "{:<25} | {:<15} | {:<15} | {:+}",
        "Critical Misses",
        a,
        b,
        b - a
    );

    out
}

/// Header of a detailed results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    pub timestamp: String,
    pub total_cases: usize,
    pub framework_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
}

/// Everything needed to re-examine a run later: its results and the test
/// cases they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResults {
    pub evaluation_metadata: EvaluationMetadata,
    pub results: Vec<EvaluationResult>,
    pub test_cases: Vec<TestCase>,
}

impl DetailedResults {
    pub fn new(
        timestamp: String,
        system_name: Option<String>,
        results: Vec<EvaluationResult>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            evaluation_metadata: EvaluationMetadata {
                timestamp,
                total_cases: results.len(),
                framework_version: FRAMEWORK_VERSION.to_string(),
                system_name,
            },
            results,
            test_cases,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::format("detailed results", e.to_string()))
    }

    /// Parse a detailed results file. `source_name` (usually the path) is
    /// named in every error.
    pub fn from_json(source_name: &str, text: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(text).map_err(|e| {
            HarnessError::format(
                source_name,
                format!("line {}, column {}: {}", e.line(), e.column(), e),
            )
        })?;

        let version = &parsed.evaluation_metadata.framework_version;
        let major = version.split('.').next().unwrap_or_default();
        let supported = FRAMEWORK_VERSION.split('.').next().unwrap_or_default();
        if major != supported {
            return Err(HarnessError::format(
                source_name,
                format!(
                    "unsupported framework_version '{}' (expected {}.x)",
                    version, supported
                ),
            ));
        }
        for case in &parsed.test_cases {
            case.validate()
                .map_err(|e| HarnessError::format(source_name, e.to_string()))?;
        }
        Ok(parsed)
    }

    /// Recompute the report for the stored results.
    pub fn report(&self) -> BenchmarkReport {
        let name = self
            .evaluation_metadata
            .system_name
            .as_deref()
            .unwrap_or("Unknown");
        generate_report(
            &self.results,
            &self.test_cases,
            name,
            self.evaluation_metadata.timestamp.clone(),
        )
    }
}
