//! # Bugscout
//!
//! A local-first debugging assistant: incremental code indexing plus
//! dual-memory retrieval, driving grounded bug diagnosis with a local LLM.
//!
//! The indexing side keeps a vector index of the project's source in sync
//! with the working tree. A content-hash manifest records what has been
//! indexed; each sync pass diffs a fresh scan against it and only re-embeds
//! what actually changed. The retrieval side combines three context sources
//! per question: fresh top-K code chunks, a verbatim buffer of recent
//! conversation turns, and semantic recall over turns the buffer evicted.
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Scanner │──▶│ Manifest diff │──▶│ Chunk + Embed │──▶ SQLite vectors
//! └──────────┘   └───────────────┘   └──────────────┘
//!
//! question ──▶ intent ──▶ code search ──┐
//!                         buffer ───────┼──▶ compose ──▶ generate
//!                         recall ───────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and its content hash |
//! | [`scanner`] | Deterministic project tree walk with content hashing |
//! | [`manifest`] | Indexed-state manifest, diffing, atomic commit, lock |
//! | [`chunk`] | Line-addressable chunking with stable ids |
//! | [`indexer`] | The incremental sync pass |
//! | [`vector_store`] | Vector index trait, SQLite and in-memory backends |
//! | [`embedding`] | Embedding providers (Ollama, OpenAI) |
//! | [`memory`] | Conversation buffer and semantic memory |
//! | [`intent`] | Per-turn intent routing |
//! | [`compose`] | Budgeted context composition with citations |
//! | [`tools`] | Closed evidence-tool set |
//! | [`session`] | Interactive session orchestration |
//! | [`analyze`] | One-shot analysis and confidence scoring |
//! | [`llm`] | Generation backends and cancellable token streams |

pub mod analyze;
pub mod chunk;
pub mod compose;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod intent;
pub mod llm;
pub mod manifest;
pub mod memory;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod status;
pub mod tools;
pub mod vector_store;
