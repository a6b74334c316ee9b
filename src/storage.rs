//! JSON file storage for summaries.
//!
//! The whole collection lives in memory, newest first, and is written back as a
//! single document after every mutation.

use crate::agent::{Summarize, SummarizerError};
use crate::export::{self, ExportFormat, ExportOutcome};
use crate::summary::{generate_id, welcome_records, SummaryRecord};
use chrono::Local;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;

/// Buffered change events per subscriber before old ones are dropped
const EVENT_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create summary: {0}")]
    SummaryCreationFailed(#[source] SummarizerError),
    #[error("failed to save summaries: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("export to {} failed: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Change notifications for whoever presents the collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added { id: String },
    Cleared { remaining: usize },
    /// The in-memory change stands, but the file on disk is stale
    PersistFailed { message: String },
}

/// What `clear_all` leaves behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    Empty,
    Welcome,
}

/// Ordered summary collection backed by a JSON file.
///
/// Mutations take `&mut self`, so a single store never has two writes in
/// flight. Two processes sharing one file can still overwrite each other.
pub struct SummaryStore<S> {
    records: Vec<SummaryRecord>,
    path: PathBuf,
    summarizer: S,
    events: broadcast::Sender<StoreEvent>,
}

impl<S: Summarize> SummaryStore<S> {
    /// Open the store at `path`, loading whatever is there.
    ///
    /// A missing or unreadable file yields an empty store.
    pub async fn open<P: Into<PathBuf>>(path: P, summarizer: S) -> Self {
        let path = path.into();
        let records = load(&path).await;
        tracing::debug!(path = %path.display(), count = records.len(), "opened summary store");
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            records,
            path,
            summarizer,
            events,
        }
    }

    /// Records, newest first
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summarizer(&self) -> &S {
        &self.summarizer
    }

    /// Look a record up by id, or by 1-based position in the list
    pub fn find(&self, key: &str) -> Option<&SummaryRecord> {
        self.records.iter().find(|r| r.id() == key).or_else(|| {
            key.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| self.records.get(i))
        })
    }

    /// Receive change events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Summarize `text` and put the result at the head of the collection.
    ///
    /// On failure nothing is recorded and nothing is written.
    pub async fn add(&mut self, text: &str, source: Option<&str>) -> Result<SummaryRecord, StoreError> {
        let text = text.trim();
        let summary = self
            .summarizer
            .summarize(text)
            .await
            .map_err(StoreError::SummaryCreationFailed)?;

        let record = SummaryRecord::new(self.unique_id(), text, &summary, source);
        self.records.insert(0, record.clone());
        tracing::info!(id = record.id(), words = record.word_count(), "summary added");

        self.persist_or_report().await;
        self.notify(StoreEvent::Added {
            id: record.id().to_string(),
        });
        Ok(record)
    }

    /// Drop every record, optionally reseeding the welcome entries
    pub async fn clear_all(&mut self, mode: ClearMode) {
        self.records = match mode {
            ClearMode::Empty => Vec::new(),
            ClearMode::Welcome => welcome_records(),
        };
        tracing::info!(remaining = self.records.len(), "summaries cleared");

        self.persist_or_report().await;
        self.notify(StoreEvent::Cleared {
            remaining: self.records.len(),
        });
    }

    /// Write the full collection, replacing the previous file
    pub async fn persist(&self) -> Result<(), StoreError> {
        Ok(write_records(&self.path, &self.records).await?)
    }

    /// Write the collection to `target`, format chosen by its extension
    pub async fn export(&self, target: &Path) -> Result<ExportOutcome, StoreError> {
        if self.records.is_empty() {
            return Ok(ExportOutcome::NothingToExport);
        }

        let format = ExportFormat::from_path(target);
        let export_error = |source: std::io::Error| StoreError::Export {
            path: target.to_path_buf(),
            source,
        };

        let content = export::render(&self.records, format, Local::now())
            .map_err(|e| export_error(e.into()))?;
        fs::write(target, content).await.map_err(export_error)?;

        tracing::info!(path = %target.display(), %format, count = self.records.len(), "summaries exported");
        Ok(ExportOutcome::Written {
            path: target.to_path_buf(),
            format,
            count: self.records.len(),
        })
    }

    fn unique_id(&self) -> String {
        loop {
            let id = generate_id();
            if self.records.iter().all(|r| r.id() != id) {
                return id;
            }
        }
    }

    async fn persist_or_report(&self) {
        if let Err(e) = self.persist().await {
            tracing::error!(path = %self.path.display(), error = %e, "failed to save summaries");
            self.notify(StoreEvent::PersistFailed {
                message: format!("{} ({})", e, self.path.display()),
            });
        }
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn write_records(path: &Path, records: &[SummaryRecord]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn load(path: &Path) -> Vec<SummaryRecord> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read summaries, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<SummaryRecord>>(&content) {
        Ok(records) => records.into_iter().map(SummaryRecord::recounted).collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "summaries file is corrupt, starting empty");
            Vec::new()
        }
    }
}
