//! Summary record - one persisted summary and the metadata shown alongside it.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label used when a record carries no source tag
pub const DEFAULT_SOURCE_LABEL: &str = "Manual Selection";

/// Number of base-36 characters appended to the millisecond timestamp of an id
const ID_SUFFIX_LEN: usize = 9;

/// A summary together with the text it was produced from.
///
/// Records are immutable once created; the only way to get rid of one is to
/// clear the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    id: String,
    original_text: String,
    #[serde(alias = "summary")]
    summary_text: String,
    #[serde(alias = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

/// Rough size bucket of the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub fn from_word_count(words: usize) -> Self {
        if words > 500 {
            SizeClass::Large
        } else if words > 100 {
            SizeClass::Medium
        } else {
            SizeClass::Small
        }
    }

    /// Short marker for list views
    pub fn marker(&self) -> &'static str {
        match self {
            SizeClass::Small => "·",
            SizeClass::Medium => "▪",
            SizeClass::Large => "■",
        }
    }
}

impl SummaryRecord {
    /// Create a record stamped with the current time
    pub(crate) fn new(id: String, original_text: &str, summary_text: &str, source: Option<&str>) -> Self {
        Self::stamped(id, original_text, summary_text, source, Utc::now())
    }

    pub(crate) fn stamped(
        id: String,
        original_text: &str,
        summary_text: &str,
        source: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let original_text = original_text.trim().to_string();
        Self {
            id,
            word_count: word_count(&original_text),
            original_text,
            summary_text: summary_text.trim().to_string(),
            created_at,
            source: source.map(str::to_string),
        }
    }

    /// Recompute derived fields after deserialization
    pub(crate) fn recounted(mut self) -> Self {
        self.word_count = word_count(&self.original_text);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn summary_text(&self) -> &str {
        &self.summary_text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Source tag, or the default label when none was given
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE_LABEL)
    }

    pub fn size_class(&self) -> SizeClass {
        SizeClass::from_word_count(self.word_count)
    }

    /// Creation time in the local timezone, formatted for people
    pub fn created_local(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Compact age relative to `now`: `now`, `12m`, `3h`, `2d`
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        let minutes = (now - self.created_at).num_minutes();
        if minutes < 1 {
            "now".to_string()
        } else if minutes < 60 {
            format!("{}m", minutes)
        } else if minutes < 1440 {
            format!("{}h", minutes / 60)
        } else {
            format!("{}d", minutes / 1440)
        }
    }

    /// One-line description for list views, e.g. `42w • 5m`
    pub fn description(&self, now: DateTime<Utc>) -> String {
        format!("{}w • {}", self.word_count, self.age_label(now))
    }

    /// Labelled fields for a detail view
    pub fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Summary", preview(&self.summary_text, 100)),
            ("Word Count", self.word_count.to_string()),
            ("Created", self.created_local()),
            ("Source", self.source_label().to_string()),
        ]
    }
}

/// Whitespace-delimited token count of `text`
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Generate a record id: unix milliseconds followed by random base-36 characters
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    format!("{}{}", millis, base36(Uuid::new_v4().as_u128(), ID_SUFFIX_LEN))
}

fn base36(mut value: u128, len: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    (0..len)
        .map(|_| {
            let digit = DIGITS[(value % 36) as usize] as char;
            value /= 36;
            digit
        })
        .collect()
}

/// Records shown after the store has been cleared from an interactive view
pub fn welcome_records() -> Vec<SummaryRecord> {
    vec![
        SummaryRecord::new(
            generate_id(),
            "Welcome to recap! Select or pipe some text and recap will summarize it for you.",
            "Welcome! recap is ready to summarize your text selections.",
            Some("welcome"),
        ),
        SummaryRecord::new(
            generate_id(),
            "To use: 1. Select some text 2. Run `recap add` or press `a` here 3. View results in this list",
            "Instructions: select text, add it, then browse the summaries here.",
            Some("welcome"),
        ),
    ]
}
