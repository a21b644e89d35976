//! `kbh ask`: answer one question with the retrieval pipeline.

use std::sync::Arc;

use anyhow::Result;

use kb_harness_core::pipeline::{QaPipeline, QaResponse};

use crate::collection::open_collection;
use crate::completion::create_completion;
use crate::config::Config;

/// Build the QA pipeline over the configured collection and model.
pub async fn build_pipeline(
    config: &Config,
    collection_name: Option<&str>,
    top_k: Option<usize>,
) -> Result<QaPipeline> {
    let collection = open_collection(config, collection_name).await?;
    let completion = create_completion(&config.llm)?;
    Ok(QaPipeline::new(Arc::new(collection), completion)
        .with_top_k(top_k.unwrap_or(config.retrieval.top_k)))
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    collection_name: Option<&str>,
    json: bool,
) -> Result<()> {
    let pipeline = build_pipeline(config, collection_name, top_k).await?;
    let response = pipeline.ask(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &QaResponse) {
    println!("Q: {}", response.question);
    println!();
    println!("A: {}", response.answer);
    println!();

    if response.retrieved_context.is_empty() {
        println!("(no context retrieved)");
        return;
    }

    println!("--- Retrieved context ({}) ---", response.retrieved_context.len());
    for chunk in &response.retrieved_context {
        let preview: String = chunk.content.chars().take(200).collect();
        match chunk.relevance_score {
            Some(score) => println!("[{}] relevance {:.3}", chunk.chunk_id, score),
            None => println!("[{}]", chunk.chunk_id),
        }
        println!("{}", preview.replace('\n', " ").trim());
        println!();
    }

    println!("--- Evidence ---");
    for evidence in &response.evidence {
        match &evidence.page {
            Some(page) => println!(
                "  {} ({}, page {}, {} chars)",
                evidence.source, evidence.source_id, page, evidence.chunk_size
            ),
            None => println!(
                "  {} ({}, {} chars)",
                evidence.source, evidence.source_id, evidence.chunk_size
            ),
        }
    }
}
