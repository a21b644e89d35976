use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kbh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kbh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs = r#"[
  {
    "id": "order-processor",
    "content": "The Order-Processor Service consumes from the new-orders Kafka topic and runs 3 replicas in production.",
    "metadata": {"title": "Order-Processor Service", "service": "order-processor", "url": "https://wiki/order-processor"}
  },
  {
    "id": "user-profile",
    "content": "The User-Profile Service is written in Java 17 and stores profiles in PostgreSQL.",
    "metadata": {"title": "User-Profile Service", "service": "user-profile"}
  },
  {
    "id": "notification-dispatcher",
    "content": "The Notification-Dispatcher Service uses Spring Boot 2.7.x and sends email through SES.",
    "metadata": {"title": "Notification-Dispatcher Service", "service": "notification-dispatcher"}
  }
]"#;
    fs::write(root.join("docs.json"), docs).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kbh.sqlite"

[embedding]
provider = "hash"
dims = 256

[llm]
provider = "disabled"

[retrieval]
top_k = 2

[benchmark]
output_dir = "{root}/results"

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kbh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kbh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kbh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kbh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn docs_path(config_path: &Path) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("docs.json").to_str().unwrap().to_string()
}

fn ingested_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let docs = docs_path(&config_path);
    let (stdout, stderr, success) = run_kbh(&config_path, &["ingest", &docs]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kbh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kbh.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kbh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kbh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_writes_records() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_path(&config_path);

    let (stdout, stderr, success) = run_kbh(&config_path, &["ingest", &docs]);
    assert!(success, "ingest failed: stderr={}", stderr);
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("chunks written: 3"));
    assert!(stdout.contains("team_knowledge (3 records)"));
}

#[test]
fn test_ingest_twice_replaces_records() {
    let (_tmp, config_path) = ingested_env();
    let docs = docs_path(&config_path);

    let (stdout, _, success) = run_kbh(&config_path, &["ingest", &docs]);
    assert!(success);
    assert!(stdout.contains("(3 records)"), "duplicates after re-ingest: {}", stdout);
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    let docs = docs_path(&config_path);

    let (stdout, _, success) = run_kbh(&config_path, &["ingest", &docs, "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("documents found: 3"));
    assert!(!tmp.path().join("data/kbh.sqlite").exists());
}

#[test]
fn test_ingest_clear_existing() {
    let (tmp, config_path) = ingested_env();
    let single = tmp.path().join("single.json");
    fs::write(
        &single,
        r#"[{"id": "runbook", "content": "Restart the consumer group after a rebalance storm."}]"#,
    )
    .unwrap();

    let (stdout, _, success) = run_kbh(
        &config_path,
        &["ingest", single.to_str().unwrap(), "--clear-existing"],
    );
    assert!(success);
    assert!(stdout.contains("cleared records: 3"));
    assert!(stdout.contains("(1 records)"));
}

#[test]
fn test_ingest_malformed_json_fails() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("bad.json");
    fs::write(&bad, "[{\"id\": \"a\",").unwrap();

    let (_, stderr, success) = run_kbh(&config_path, &["ingest", bad.to_str().unwrap()]);
    assert!(!success, "malformed JSON should fail");
    assert!(stderr.contains("bad.json"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_invalid_document_rejects_batch() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("partial.json");
    fs::write(&bad, r#"[{"id": "ok", "content": "fine"}, {"content": "no id"}]"#).unwrap();

    let (_, _, success) = run_kbh(&config_path, &["ingest", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(!tmp.path().join("data/kbh.sqlite").exists());
}

#[test]
fn test_ingest_test_search() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_path(&config_path);

    let (stdout, _, success) = run_kbh(
        &config_path,
        &["ingest", &docs, "--test-search", "Kafka topic new-orders"],
    );
    assert!(success);
    assert!(stdout.contains("test search"));
    assert!(stdout.contains("1. Order-Processor Service"));
}

#[test]
fn test_search_ranks_closest_first() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, stderr, success) = run_kbh(
        &config_path,
        &["search", "Which Kafka topic does Order-Processor consume?"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["), "stdout: {}", stdout);
    assert!(stdout.lines().next().unwrap().contains("Order-Processor Service"));
    assert!(stdout.contains("url: https://wiki/order-processor"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = ingested_env();

    let (first, _, _) = run_kbh(&config_path, &["search", "Java PostgreSQL", "--json"]);
    let (second, _, _) = run_kbh(&config_path, &["search", "Java PostgreSQL", "--json"]);
    assert_eq!(first, second);
}

#[test]
fn test_search_where_filter() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(
        &config_path,
        &[
            "search",
            "Kafka topic new-orders",
            "--where",
            "service=user-profile",
            "--json",
        ],
    );
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "user-profile");
}

#[test]
fn test_search_k_limits_results() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(&config_path, &["search", "Service", "-k", "1", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = ingested_env();

    let (_, _, success) = run_kbh(&config_path, &["search", "  "]);
    assert!(!success, "empty query should fail");
}

#[test]
fn test_search_bad_where_pair() {
    let (_tmp, config_path) = ingested_env();

    let (_, _, success) = run_kbh(&config_path, &["search", "kafka", "--where", "service"]);
    assert!(!success);
}

#[test]
fn test_info_reports_count_and_space() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(&config_path, &["info"]);
    assert!(success);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["name"], "team_knowledge");
    assert_eq!(info["count"], 3);
    assert_eq!(info["metadata"]["hnsw:space"], "cosine");
}

#[test]
fn test_collection_flag_isolates_collections() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(&config_path, &["info", "--collection", "scratch"]);
    assert!(success);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["name"], "scratch");
    assert_eq!(info["count"], 0);
}

#[test]
fn test_peek_lists_records_by_id() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(&config_path, &["peek", "--limit", "2"]);
    assert!(success);
    let ids: Vec<&str> = stdout.lines().filter(|l| !l.starts_with(' ')).collect();
    assert_eq!(ids, vec!["notification-dispatcher", "order-processor"]);
}

#[test]
fn test_delete_ignores_unknown_ids() {
    let (_tmp, config_path) = ingested_env();

    let (stdout, _, success) = run_kbh(&config_path, &["delete", "user-profile", "missing"]);
    assert!(success);
    assert!(stdout.contains("deleted 1 of 2 records"));

    let (stdout, _, _) = run_kbh(&config_path, &["info"]);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["count"], 2);
}

#[test]
fn test_ask_fails_when_llm_disabled() {
    let (_tmp, config_path) = ingested_env();

    let (_, stderr, success) = run_kbh(&config_path, &["ask", "What topic does Order-Processor use?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, _, success) = run_kbh(&missing, &["info"]);
    assert!(!success);
}

#[test]
fn test_bench_quick_saves_results_and_show_renders_them() {
    let (tmp, config_path) = ingested_env();
    let out_dir = tmp.path().join("results");

    let (stdout, stderr, success) = run_kbh(
        &config_path,
        &["bench", "quick", "--cases", "2", "--progress", "off"],
    );
    assert!(success, "bench quick failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("RAG SYSTEM BENCHMARK REPORT"));
    assert!(stdout.contains("Total Test Cases: 2"));

    let saved: Vec<PathBuf> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("benchmark_results_pipeline_quick_"), "{}", name);

    let (shown, _, success) = run_kbh(&config_path, &["bench", "show", saved[0].to_str().unwrap()]);
    assert!(success);
    assert!(shown.contains("Total Test Cases: 2"));
    assert!(shown.contains("Accuracy: 0.0% (0/2)"));
}

#[test]
fn test_bench_show_without_config() {
    let (tmp, config_path) = ingested_env();
    run_kbh(
        &config_path,
        &["bench", "quick", "--cases", "1", "--progress", "off"],
    );
    let saved = fs::read_dir(tmp.path().join("results"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    let missing = tmp.path().join("nope.toml");
    let (stdout, _, success) = run_kbh(&missing, &["bench", "show", saved.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Total Test Cases: 1"));
}

#[test]
fn test_bench_show_reports_broken_config() {
    let (tmp, config_path) = ingested_env();
    run_kbh(
        &config_path,
        &["bench", "quick", "--cases", "1", "--progress", "off"],
    );
    let saved = fs::read_dir(tmp.path().join("results"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    let broken = tmp.path().join("broken.toml");
    fs::write(&broken, "[logging\nlevel = ").unwrap();
    let (stdout, _, success) = run_kbh(&broken, &["bench", "show", saved.to_str().unwrap()]);
    assert!(!success, "broken config should fail: {}", stdout);
    assert!(!stdout.contains("Total Test Cases"));
}

#[test]
fn test_bench_show_rejects_malformed_file() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("results.json");
    fs::write(&bad, "{\"results\": 3}").unwrap();

    let (_, _, success) = run_kbh(&config_path, &["bench", "show", bad.to_str().unwrap()]);
    assert!(!success);
}

#[test]
fn test_bench_unknown_progress_mode() {
    let (_tmp, config_path) = ingested_env();

    let (_, _, success) = run_kbh(&config_path, &["bench", "quick", "--progress", "loud"]);
    assert!(!success);
}

#[test]
fn test_failed_clear_existing_keeps_old_records() {
    let (_tmp, config_path) = ingested_env();
    let docs = docs_path(&config_path);
    let healthy = fs::read_to_string(&config_path).unwrap();

    fs::write(
        &config_path,
        healthy.replace(r#"provider = "hash""#, r#"provider = "disabled""#),
    )
    .unwrap();
    let (_, stderr, success) = run_kbh(&config_path, &["ingest", &docs, "--clear-existing"]);
    assert!(!success, "ingest with embeddings disabled should fail");
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    fs::write(&config_path, healthy).unwrap();
    let (stdout, _, success) = run_kbh(&config_path, &["info"]);
    assert!(success);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["count"], 3);
}
