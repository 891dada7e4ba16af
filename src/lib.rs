//! # PDF Chat
//!
//! Retrieval-augmented chat over uploaded PDF documents.
//!
//! Uploaded PDFs are split into page records, chunked with their source file
//! and page number attached, embedded, and stored in a vector index. Each
//! question retrieves the nearest chunks, asks a hosted LLM to answer from
//! them alone, and streams the answer back with citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│  Embed   │──▶│ Vector index │
//! │ PDF→page │   │ src+pg  │   │ Groq/Gem │   │ memory/disk  │
//! └──────────┘   └─────────┘   └──────────┘   └──────┬───────┘
//!                                                    │
//!                 ┌──────────────┐   ┌───────────┐   │
//!   question ───▶ │ Orchestrator │──▶│ RAG chain │◀──┘
//!                 │ history+stats│◀──│ streaming │
//!                 └──────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! pdfchat ingest report.pdf appendix.pdf
//! pdfchat ask "What are the key findings?"
//! pdfchat chat report.pdf        # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`provider`] | Provider catalog and backend selection |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Recursive character chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index and its backends |
//! | [`llm`] | Streaming chat model clients |
//! | [`chain`] | RAG and summary chains |
//! | [`analytics`] | Session analytics |
//! | [`session`] | Per-session state |
//! | [`orchestrator`] | Single-turn protocol and quick actions |
//! | [`ingest`] | Upload pipeline |
//! | [`stats`] | Workspace statistics |
//! | [`export`] | Chat history CSV export |
//! | [`db`] | SQLite connection for the persistent index |
//! | [`migrate`] | Persistent index schema |

pub mod analytics;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod stats;
