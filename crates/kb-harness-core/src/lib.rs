//! # kb-harness core
//!
//! Pure retrieval-and-evaluation logic for kb-harness: data models,
//! chunking, the vector store abstraction, the QA pipeline, and the
//! benchmark harness.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The
//! embedding backend, the answer-generating model, and the persistent
//! store are all reached through traits ([`embedding::Embedder`],
//! [`completion::CompletionProvider`], [`store::VectorStore`]) that the
//! `kb-harness` application crate implements.
//!
//! ```text
//! documents ──▶ chunk ──▶ VectorCollection::upsert
//!                               │
//! question ──▶ VectorCollection::search ──▶ QaPipeline ──▶ answer
//!
//! BenchmarkHarness::evaluate(system) ──▶ EvaluationResult* ──▶ BenchmarkReport
//! ```

pub mod benchmark;
pub mod chunk;
pub mod collection;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod store;

pub use error::{HarnessError, Result};
