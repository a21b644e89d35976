//! # KB Harness
//!
//! A local-first knowledge base for engineering documentation, with a
//! question-answering pipeline and a benchmark that measures it.
//!
//! Documents come from an external connector as a JSON batch. They are
//! chunked, embedded, and stored in a SQLite-backed vector collection. The
//! QA pipeline retrieves the closest chunks and asks a language model to
//! answer from them. The benchmark runs a fixed set of documentation
//! questions against the pipeline (or any HTTP answering service) and
//! compares it with plain vector search.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌────────────┐
//! │ docs.json  │──▶│ Chunk+Embed │──▶│  SQLite    │
//! │ (connector)│   │             │   │ collection │
//! └────────────┘   └─────────────┘   └─────┬──────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌───────────┐
//!                 │ QA       │──────▶│ Benchmark │
//!                 │ pipeline │       │ harness   │
//!                 └──────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbh init                          # create database
//! kbh ingest ./docs.json            # chunk, embed, store
//! kbh search "kafka topic" -k 3     # similarity search
//! kbh ask "What topic does Order-Processor consume?"
//! kbh bench full                    # pipeline vs. baseline
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Language model providers |
//! | [`http`] | Shared HTTP retry loop |
//! | [`collection`] | Opening the configured collection |
//! | [`ingest`] | Document batch ingestion |
//! | [`search`] | `kbh search` |
//! | [`ask`] | `kbh ask` |
//! | [`info`] | `kbh info`, `peek`, `delete` |
//! | [`bench_cmd`] | `kbh bench` |
//! | [`progress`] | Benchmark progress reporting |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask;
pub mod bench_cmd;
pub mod collection;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod info;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
