use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use kb_harness::bench_cmd::{save_results, BaselineSystem};
use kb_harness::config::Config;
use kb_harness::embedding::HashEmbedder;
use kb_harness::sqlite_store::SqliteStore;
use kb_harness::{db, migrate};
use kb_harness_core::benchmark::{
    BenchmarkHarness, DetailedResults, Difficulty, Importance, TestCase,
};
use kb_harness_core::collection::VectorCollection;
use kb_harness_core::completion::CompletionProvider;
use kb_harness_core::models::Document;
use kb_harness_core::pipeline::{QaPipeline, NOT_AVAILABLE_ANSWER};

/// Answers with the context block of the prompt, verbatim.
struct ExtractiveModel {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for ExtractiveModel {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &str) -> kb_harness_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = prompt
            .split_once("Context:\n")
            .map(|(_, rest)| rest)
            .unwrap_or(prompt);
        let context = context
            .split_once("\n\nQuestion:")
            .map(|(ctx, _)| ctx)
            .unwrap_or(context);
        Ok(context.to_string())
    }
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "order-processor",
            "The Order-Processor Service consumes from the new-orders Kafka topic.",
        )
        .with_meta("title", "Order-Processor Service"),
        Document::new(
            "user-profile",
            "The User-Profile Service is written in Java 17.",
        )
        .with_meta("title", "User-Profile Service"),
        Document::new(
            "notification-dispatcher",
            "The Notification-Dispatcher Service uses Spring Boot 2.7.x for email delivery.",
        )
        .with_meta("title", "Notification-Dispatcher Service"),
    ]
}

fn case(query: &str, expected: &str, importance: Importance, category: &str) -> TestCase {
    TestCase {
        query: query.to_string(),
        expected_answer: expected.to_string(),
        ground_truth_location: "Service pages".to_string(),
        difficulty: Difficulty::Easy,
        importance,
        category: category.to_string(),
        requires_reasoning: None,
        why_hard: None,
    }
}

fn cases() -> Vec<TestCase> {
    vec![
        case(
            "Which Kafka topic does the Order-Processor consume?",
            "new-orders",
            Importance::Medium,
            "Configuration",
        ),
        case(
            "What language is the User-Profile Service written in?",
            "Java 17",
            Importance::Low,
            "Technology",
        ),
        case(
            "Who approves production deploys?",
            "release manager signs",
            Importance::Critical,
            "Process",
        ),
    ]
}

async fn sqlite_collection(tmp: &TempDir) -> Arc<VectorCollection> {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("data/kbh.sqlite");
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let mut collection = VectorCollection::new(
        Arc::new(SqliteStore::new(pool)),
        Arc::new(HashEmbedder::new(256)),
    );
    collection.create_or_get("team_knowledge").await.unwrap();
    Arc::new(collection)
}

#[tokio::test]
async fn test_pipeline_answers_from_sqlite_collection() {
    let tmp = TempDir::new().unwrap();
    let collection = sqlite_collection(&tmp).await;
    collection.upsert(&corpus()).await.unwrap();

    let model = Arc::new(ExtractiveModel {
        calls: AtomicUsize::new(0),
    });
    let pipeline = QaPipeline::new(Arc::clone(&collection), model.clone()).with_top_k(1);

    let response = pipeline
        .ask("Which Kafka topic does the Order-Processor consume?")
        .await
        .unwrap();
    assert!(response.answer.contains("new-orders"));
    assert_eq!(response.retrieved_context.len(), 1);
    assert_eq!(response.retrieved_context[0].chunk_id, "order-processor");
    assert_eq!(response.evidence[0].source, "Order-Processor Service");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pipeline_skips_model_on_empty_collection() {
    let tmp = TempDir::new().unwrap();
    let collection = sqlite_collection(&tmp).await;

    let model = Arc::new(ExtractiveModel {
        calls: AtomicUsize::new(0),
    });
    let pipeline = QaPipeline::new(collection, model.clone());

    let response = pipeline.ask("Anything at all?").await.unwrap();
    assert_eq!(response.answer, NOT_AVAILABLE_ANSWER);
    assert!(response.retrieved_context.is_empty());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_benchmark_pipeline_and_baseline() {
    let tmp = TempDir::new().unwrap();
    let collection = sqlite_collection(&tmp).await;
    collection.upsert(&corpus()).await.unwrap();

    let harness = BenchmarkHarness::new(cases()).unwrap();
    let model = Arc::new(ExtractiveModel {
        calls: AtomicUsize::new(0),
    });
    let pipeline = QaPipeline::new(Arc::clone(&collection), model).with_top_k(1);
    let baseline = BaselineSystem::new(Arc::clone(&collection), 500);

    let candidate = harness.evaluate(&pipeline).await.unwrap();
    assert_eq!(candidate.report.total_cases, 3);
    assert_eq!(candidate.report.correct_answers, 2);
    assert_eq!(
        candidate.report.critical_misses,
        vec!["Who approves production deploys?".to_string()]
    );
    assert_eq!(candidate.report.accuracy_by_difficulty["HARD"], 0.0);
    assert_eq!(candidate.report.accuracy_by_category["Technology"], 1.0);

    let base = harness.evaluate(&baseline).await.unwrap();
    assert_eq!(base.report.system_name, "Baseline Vector Search");
    assert_eq!(base.report.correct_answers, 2);
    assert!(base.results[0]
        .actual_answer
        .starts_with("The Order-Processor Service"));
}

#[tokio::test]
async fn test_saved_results_recompute_the_same_report() {
    let tmp = TempDir::new().unwrap();
    let collection = sqlite_collection(&tmp).await;
    collection.upsert(&corpus()).await.unwrap();

    let harness = BenchmarkHarness::new(cases()).unwrap();
    let run = harness
        .evaluate(&BaselineSystem::new(collection, 500))
        .await
        .unwrap();

    let path = save_results(&tmp.path().join("results"), "baseline", &harness, &run).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let detailed = DetailedResults::from_json("saved", &text).unwrap();

    let recomputed = detailed.report();
    assert_eq!(recomputed.system_name, run.report.system_name);
    assert_eq!(recomputed.evaluation_timestamp, run.report.evaluation_timestamp);
    assert_eq!(recomputed.correct_answers, run.report.correct_answers);
    assert_eq!(recomputed.critical_misses, run.report.critical_misses);
    assert_eq!(
        recomputed.accuracy_by_category,
        run.report.accuracy_by_category
    );
}

#[tokio::test]
async fn test_sqlite_collection_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let collection = sqlite_collection(&tmp).await;
        collection.upsert(&corpus()).await.unwrap();
    }

    let collection = sqlite_collection(&tmp).await;
    let info = collection.info().await.unwrap();
    assert_eq!(info.count, 3);
    let hits = collection
        .search("Spring Boot email", 1, None)
        .await
        .unwrap();
    assert_eq!(hits[0].id, "notification-dispatcher");
}
