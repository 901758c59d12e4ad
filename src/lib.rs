//! # Lectern
//!
//! Retrieval-augmented question answering over course materials.
//!
//! Lectern ingests structured course documents (a title/link/instructor
//! header plus `Lesson N:` sections), chunks them with sentence-aware
//! overlap, and answers questions by letting a tool-calling language model
//! search the indexed content and course outlines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Course docs │──▶│  Processor  │──▶│ In-memory│
//! │  .txt/.md   │   │ Parse+Chunk │   │  index   │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ search tools
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(lectern) │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lectern ingest                  # index the configured docs folder
//! lectern query "What is MCP?"    # one-off question
//! lectern courses                 # list indexed courses
//! lectern serve                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sentence segmentation and overlapping chunks |
//! | [`processor`] | Course document parsing |
//! | [`store`] | Vector-store capability and in-memory index |
//! | [`tools`] | Search tools and the dispatch registry |
//! | [`generator`] | Model provider and the tool-calling loop |
//! | [`session`] | Conversation sessions |
//! | [`rag`] | Composition layer |
//! | [`ingest`] | Ingestion command |
//! | [`server`] | JSON HTTP API |

pub mod chunk;
pub mod config;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod processor;
pub mod rag;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;
