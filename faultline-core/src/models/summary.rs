use serde::{Deserialize, Serialize};
use std::fmt;

use super::event::ExceptionEvent;

/// Opaque identifier of an appended summary, used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted summary. Records are append-only; the newest one for a kind wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SummaryRecord {
    #[sqlx(rename = "exception_name")]
    pub kind: String,
    #[sqlx(rename = "exception_date")]
    pub created_at: String,
    #[sqlx(rename = "exception_file")]
    pub source_file: String,
    #[sqlx(rename = "exception_method")]
    pub source_method: String,
    #[sqlx(rename = "exception_line")]
    pub source_line: String,
    #[sqlx(rename = "exception_summary")]
    pub summary_text: String,
}

impl SummaryRecord {
    /// Snapshot the triggering event's fields alongside a fresh summary.
    pub fn from_event(event: &ExceptionEvent, summary_text: impl Into<String>) -> Self {
        Self {
            kind: event.kind.clone(),
            created_at: event.occurred_at.clone(),
            source_file: event.source_file.clone(),
            source_method: event.source_method.clone(),
            source_line: event.source_line.clone(),
            summary_text: summary_text.into(),
        }
    }
}
