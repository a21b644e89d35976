//! `kbh bench`: run the documentation benchmark.
//!
//! | Mode | What it does |
//! |------|--------------|
//! | `full` | Pipeline (or `--endpoint`) vs. baseline, both saved, plus a comparison |
//! | `quick` | First `quick_cases` cases against the pipeline |
//! | `interactive` | Ask free-form questions from stdin and time the answers |
//! | `show` | Re-render the report of a saved results file |
//!
//! Detailed results are written to
//! `<output_dir>/benchmark_results_<label>_<unix-seconds>.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use kb_harness_core::benchmark::{
    render_comparison, render_report, AnswerResult, AnswerSystem, BenchmarkHarness, BenchmarkRun,
    DetailedResults,
};
use kb_harness_core::collection::VectorCollection;
use kb_harness_core::error::HarnessError;
use kb_harness_core::pipeline::QaPipeline;

use crate::collection::open_collection;
use crate::completion::create_completion;
use crate::config::Config;
use crate::http;
use crate::progress::ProgressMode;

/// Answer shown by the baseline when retrieval finds nothing.
pub const BASELINE_EMPTY_ANSWER: &str = "No relevant information found.";

/// Plain vector search: the top hit's text is the answer.
pub struct BaselineSystem {
    collection: Arc<VectorCollection>,
    preview_chars: usize,
}

impl BaselineSystem {
    pub fn new(collection: Arc<VectorCollection>, preview_chars: usize) -> Self {
        Self {
            collection,
            preview_chars,
        }
    }
}

#[async_trait]
impl AnswerSystem for BaselineSystem {
    fn name(&self) -> &str {
        "Baseline Vector Search"
    }

    async fn answer(&self, query: &str) -> kb_harness_core::Result<AnswerResult> {
        let hits = self.collection.search(query, 1, None).await?;
        let Some(top) = hits.first() else {
            return Ok(AnswerResult::text(BASELINE_EMPTY_ANSWER));
        };
        if top.content.chars().count() > self.preview_chars {
            let cut: String = top.content.chars().take(self.preview_chars).collect();
            Ok(AnswerResult::text(format!("{}...", cut)))
        } else {
            Ok(AnswerResult::text(top.content.clone()))
        }
    }
}

/// An answering service reached over HTTP.
///
/// Each question is POSTed as `{"question": "..."}`; the reply must be a
/// JSON string or an object with a string `answer` field.
pub struct HttpAnswerSystem {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    name: String,
}

impl HttpAnswerSystem {
    pub fn new(endpoint: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            anyhow::bail!("benchmark endpoint must be an http(s) URL, got '{}'", endpoint);
        }
        Ok(Self {
            client: http::client(timeout_secs)?,
            endpoint: endpoint.to_string(),
            max_retries,
            name: format!("HTTP service ({})", endpoint),
        })
    }
}

#[async_trait]
impl AnswerSystem for HttpAnswerSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn answer(&self, query: &str) -> kb_harness_core::Result<AnswerResult> {
        let body = serde_json::json!({ "question": query });
        let json = http::send_json_with_retry(&self.endpoint, self.max_retries, || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;
        AnswerResult::from_json(json)
    }
}

/// Options shared by the benchmark modes.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Evaluate this HTTP service instead of the built-in pipeline.
    pub endpoint: Option<String>,
    pub progress: ProgressMode,
    /// Overrides `[benchmark] output_dir`.
    pub output_dir: Option<PathBuf>,
}

fn is_configuration(err: &anyhow::Error) -> bool {
    err.downcast_ref::<HarnessError>()
        .is_some_and(HarnessError::is_configuration)
}

/// The system under test: the external endpoint when one is configured,
/// otherwise the QA pipeline over `collection`.
fn candidate_system(
    config: &Config,
    options: &BenchOptions,
    collection: &Arc<VectorCollection>,
) -> Result<(Box<dyn AnswerSystem>, &'static str)> {
    let endpoint = options
        .endpoint
        .as_deref()
        .or(config.benchmark.endpoint.as_deref());
    if let Some(endpoint) = endpoint {
        let system =
            HttpAnswerSystem::new(endpoint, config.llm.timeout_secs, config.llm.max_retries)?;
        return Ok((Box::new(system), "endpoint"));
    }
    let completion = create_completion(&config.llm)?;
    let pipeline =
        QaPipeline::new(Arc::clone(collection), completion).with_top_k(config.retrieval.top_k);
    Ok((Box::new(pipeline), "pipeline"))
}

async fn evaluate(
    harness: &BenchmarkHarness,
    system: &dyn AnswerSystem,
    progress: ProgressMode,
) -> Result<BenchmarkRun> {
    let mut observer = progress.observer();
    Ok(harness.evaluate_observed(system, observer.as_mut()).await?)
}

/// Write a run's detailed results and return the file path.
pub fn save_results(
    output_dir: &Path,
    label: &str,
    harness: &BenchmarkHarness,
    run: &BenchmarkRun,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    let path = output_dir.join(format!(
        "benchmark_results_{}_{}.json",
        label,
        chrono::Utc::now().timestamp()
    ));
    let json = harness.detailed_results(run).to_json_pretty()?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write results file: {}", path.display()))?;
    info!(path = %path.display(), "Detailed results saved");
    Ok(path)
}

fn output_dir(config: &Config, options: &BenchOptions) -> PathBuf {
    options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.benchmark.output_dir.clone())
}

/// Evaluate the candidate and the baseline, save both, print both reports
/// and a comparison.
pub async fn run_full(config: &Config, options: &BenchOptions) -> Result<()> {
    let collection = Arc::new(open_collection(config, None).await?);
    let harness = BenchmarkHarness::with_default_cases();
    let out_dir = output_dir(config, options);

    let (candidate, label) = candidate_system(config, options, &collection)?;
    let baseline = BaselineSystem::new(
        Arc::clone(&collection),
        config.retrieval.baseline_preview_chars,
    );

    info!(system = candidate.name(), "Evaluating candidate system");
    let candidate_run = match evaluate(&harness, candidate.as_ref(), options.progress).await {
        Ok(run) => {
            let path = save_results(&out_dir, label, &harness, &run)?;
            println!("Detailed results: {}", path.display());
            Some(run)
        }
        Err(e) if is_configuration(&e) => {
            error!("Skipping {}: {:#}", candidate.name(), e);
            None
        }
        Err(e) => return Err(e),
    };

    info!(system = baseline.name(), "Evaluating baseline system");
    let baseline_run = evaluate(&harness, &baseline, options.progress).await?;
    let path = save_results(&out_dir, "baseline", &harness, &baseline_run)?;
    println!("Detailed results: {}", path.display());

    if let Some(run) = &candidate_run {
        println!();
        print!("{}", render_report(&run.report));
    }
    println!();
    print!("{}", render_report(&baseline_run.report));

    if let Some(run) = &candidate_run {
        println!();
        print!("{}", render_comparison(&run.report, &baseline_run.report));
    }
    Ok(())
}

/// Evaluate the first `cases` test cases (default `[benchmark]
/// quick_cases`) against the candidate system.
pub async fn run_quick(config: &Config, cases: Option<usize>, options: &BenchOptions) -> Result<()> {
    let collection = Arc::new(open_collection(config, None).await?);
    let harness =
        BenchmarkHarness::with_default_cases().quick(cases.unwrap_or(config.benchmark.quick_cases));
    let (candidate, label) = candidate_system(config, options, &collection)?;

    let run = evaluate(&harness, candidate.as_ref(), options.progress).await?;
    let path = save_results(&output_dir(config, options), &format!("{}_quick", label), &harness, &run)?;
    print!("{}", render_report(&run.report));
    println!();
    println!("Detailed results: {}", path.display());
    Ok(())
}

/// Read questions from stdin until `quit`, `exit` or an empty line.
pub async fn run_interactive(config: &Config, options: &BenchOptions) -> Result<()> {
    let collection = Arc::new(open_collection(config, None).await?);
    let (candidate, _) = candidate_system(config, options, &collection)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(b"\nEnter your test query (or 'quit' to exit): ")
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() || matches!(query.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        let started = Instant::now();
        let outcome = candidate.answer(query).await;
        let elapsed = started.elapsed().as_secs_f64();

        println!();
        println!("Query: {}", query);
        println!("Response Time: {:.2}s", elapsed);
        match outcome {
            Ok(answer) => println!("Answer: {}", answer.answer),
            Err(e) => println!("Error: {}", e),
        }
        println!("{}", "-".repeat(50));
    }
    Ok(())
}

/// Print the recomputed report of a saved detailed results file.
pub fn run_show(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    let detailed = DetailedResults::from_json(&path.display().to_string(), &text)?;
    print!("{}", render_report(&detailed.report()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_harness_core::embedding::Embedder;
    use kb_harness_core::models::Document;
    use kb_harness_core::store::memory::InMemoryStore;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::embedding::HashEmbedder;

    async fn collection(docs: &[Document]) -> Arc<VectorCollection> {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let mut collection = VectorCollection::new(Arc::new(InMemoryStore::new()), embedder);
        collection.create_or_get("team_knowledge").await.unwrap();
        collection.upsert(docs).await.unwrap();
        Arc::new(collection)
    }

    #[tokio::test]
    async fn test_baseline_returns_top_hit_truncated() {
        let long = format!("Order-Processor consumes the new-orders topic. {}", "x".repeat(600));
        let coll = collection(&[
            Document::new("op", long),
            Document::new("up", "User-Profile Service is written in Java 17."),
        ])
        .await;
        let baseline = BaselineSystem::new(coll, 500);

        let answer = baseline
            .answer("Which topic does Order-Processor consume?")
            .await
            .unwrap();
        assert_eq!(answer.answer.chars().count(), 503);
        assert!(answer.answer.starts_with("Order-Processor consumes"));
        assert!(answer.answer.ends_with("..."));

        let short = baseline.answer("What language is User-Profile written in?").await.unwrap();
        assert_eq!(short.answer, "User-Profile Service is written in Java 17.");
    }

    #[tokio::test]
    async fn test_baseline_empty_collection() {
        let baseline = BaselineSystem::new(collection(&[]).await, 500);
        let answer = baseline.answer("anything").await.unwrap();
        assert_eq!(answer.answer, BASELINE_EMPTY_ANSWER);
    }

    #[test]
    fn test_http_system_requires_http_url() {
        assert!(HttpAnswerSystem::new("ftp://example", 5, 0).is_err());
        let system = HttpAnswerSystem::new("http://127.0.0.1:1/ask", 5, 0).unwrap();
        assert!(system.name().contains("127.0.0.1"));
    }

    #[test]
    fn test_is_configuration_downcast() {
        let err: anyhow::Error = HarnessError::Configuration("bad".into()).into();
        assert!(is_configuration(&err));
        let err: anyhow::Error = HarnessError::external("down").into();
        assert!(!is_configuration(&err));
        assert!(!is_configuration(&anyhow::anyhow!("plain")));
    }

    /// Serve every connection with the same canned HTTP response.
    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    read_request(&mut sock).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{}/ask", addr)
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 1024];
        loop {
            let n = sock.read(&mut tmp).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_http_system_parses_answer_object() {
        let url = canned_server("200 OK", r#"{"answer": "It consumes from new-orders."}"#).await;
        let system = HttpAnswerSystem::new(&url, 5, 0).unwrap();
        let answer = system.answer("What topic?").await.unwrap();
        assert_eq!(answer.answer, "It consumes from new-orders.");
    }

    #[tokio::test]
    async fn test_http_system_bad_shape_aborts_run() {
        let url = canned_server("200 OK", r#"{"result": 42}"#).await;
        let system = HttpAnswerSystem::new(&url, 5, 0).unwrap();
        let harness = BenchmarkHarness::with_default_cases().quick(2);
        let err = harness.evaluate(&system).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_http_client_error_is_recorded_per_case() {
        let url = canned_server("400 Bad Request", r#"{"error": "nope"}"#).await;
        let system = HttpAnswerSystem::new(&url, 5, 0).unwrap();
        let harness = BenchmarkHarness::with_default_cases().quick(2);
        let run = harness.evaluate(&system).await.unwrap();
        assert_eq!(run.results.len(), 2);
        assert!(run.results.iter().all(|r| r.actual_answer.starts_with("ERROR:")));
        assert_eq!(run.report.correct_answers, 0);
    }

    #[tokio::test]
    async fn test_save_and_show_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let coll = collection(&[Document::new(
            "op",
            "The Order-Processor Service consumes from the new-orders Kafka topic.",
        )])
        .await;
        let harness = BenchmarkHarness::with_default_cases().quick(1);
        let run = harness
            .evaluate(&BaselineSystem::new(coll, 500))
            .await
            .unwrap();
        assert!(run.results[0].is_correct);

        let path = save_results(dir.path(), "baseline", &harness, &run).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("benchmark_results_baseline_"));
        assert!(name.ends_with(".json"));
        run_show(&path).unwrap();
    }
}
