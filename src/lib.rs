//! # ragdesk
//!
//! A retrieval-augmented chat backend over local documents.
//!
//! ragdesk stores uploaded files in a content-addressed registry, chunks and
//! embeds their text into a SQLite vector index, and answers questions
//! through an OpenAI-compatible chat provider. Attached files (audio,
//! images, PDFs, text) can be brought into a conversation directly, in which
//! case their content replaces retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Registry │──▶│   Pipeline   │──▶│  SQLite   │
//! │ SHA-256  │   │ Chunk+Embed  │   │  vectors  │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                     ┌───────────────────┤
//!                     ▼                   ▼
//!                ┌──────────┐       ┌──────────┐
//!                │   CLI    │       │   HTTP   │
//!                │(ragdesk) │       │  (axum)  │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdesk init                      # create the index database
//! ragdesk ingest docs/*.pdf         # register and index files
//! ragdesk ask "What is covered?"    # retrieval-augmented answer
//! ragdesk serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text normalization and chunking |
//! | [`registry`] | Content-addressed document registry |
//! | [`extract`] | Per-kind text extraction |
//! | [`embedding`] | Embedding API client and vector math |
//! | [`provider`] | Chat, transcription, and vision clients |
//! | [`index`] | SQLite vector index |
//! | [`ingest`] | Upload and ingestion orchestration |
//! | [`retrieve`] | Query-time retrieval and answering |
//! | [`prompt`] | Prompt assembly |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection and migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod retrieve;
pub mod server;
