//! # Recap
//!
//! Summarize text selections with a local or cloud LLM and keep the results.
//!
//! ## Features
//!
//! - **Provider Agnostic**: Ollama, OpenAI, or an offline mock, behind one `Summarize` trait
//! - **Normalized Output**: boilerplate preambles stripped, whitespace collapsed, sentences terminated
//! - **Ordered Storage**: newest-first JSON collection with change events for any front end
//! - **Export**: JSON, Markdown and plain text reports

pub mod agent;
pub mod config;
pub mod export;
pub mod storage;
pub mod summary;
pub mod ui;

pub use agent::{ConnectionStatus, Summarize, SummarizerClient, SummarizerError};
pub use config::{Config, ConfigSource, Provider};
pub use export::{ExportFormat, ExportOutcome};
pub use storage::{ClearMode, PersistenceError, StoreError, StoreEvent, SummaryStore};
pub use summary::SummaryRecord;
