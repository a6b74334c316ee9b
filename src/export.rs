//! Rendering the summary collection as JSON, Markdown or a plain text report.

use crate::summary::SummaryRecord;
use chrono::{DateTime, Local};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

const TITLE: &str = "AI Conversation Summaries";

/// Output format, picked from the target file's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    /// `.json` and `.md` select their formats; anything else is plain text
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => ExportFormat::Json,
            Some("md") => ExportFormat::Markdown,
            _ => ExportFormat::Text,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Text => "text",
        };
        f.write_str(name)
    }
}

/// Result of an export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written {
        path: PathBuf,
        format: ExportFormat,
        count: usize,
    },
    NothingToExport,
}

/// Render `records` in `format`, stamping the document with `generated_at`
pub fn render(
    records: &[SummaryRecord],
    format: ExportFormat,
    generated_at: DateTime<Local>,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(records),
        ExportFormat::Markdown => Ok(markdown(records, generated_at)),
        ExportFormat::Text => Ok(text(records, generated_at)),
    }
}

fn markdown(records: &[SummaryRecord], generated_at: DateTime<Local>) -> String {
    let mut out = format!("# {}\n\n", TITLE);
    let _ = write!(
        out,
        "Generated on: {}\n\nTotal summaries: {}\n\n---\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S"),
        records.len()
    );

    for (index, record) in records.iter().enumerate() {
        let _ = write!(
            out,
            "## Summary {}\n\n\
             **Created:** {}\n\
             **Word Count:** {}\n\
             **Source:** {}\n\n\
             ### Summary\n{}\n\n\
             ### Original Text\n{}\n\n---\n\n",
            index + 1,
            record.created_local(),
            record.word_count(),
            record.source_label(),
            record.summary_text(),
            record.original_text()
        );
    }

    out
}

fn text(records: &[SummaryRecord], generated_at: DateTime<Local>) -> String {
    let mut out = format!("{}\n{}\n\n", TITLE, "=".repeat(30));
    let _ = write!(
        out,
        "Generated on: {}\nTotal summaries: {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S"),
        records.len()
    );

    for (index, record) in records.iter().enumerate() {
        let _ = write!(
            out,
            "Summary {}\n{}\n\
             Created: {}\n\
             Word Count: {}\n\
             Source: {}\n\n\
             Summary: {}\n\n\
             Original: {}\n\n{}\n\n",
            index + 1,
            "-".repeat(15),
            record.created_local(),
            record.word_count(),
            record.source_label(),
            record.summary_text(),
            record.original_text(),
            "=".repeat(50)
        );
    }

    out
}
