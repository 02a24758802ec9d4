use serde::{Deserialize, Serialize};

/// One exception occurrence as carried on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionEvent {
    pub occurred_at: String,
    pub kind: String,
    pub source_file: String,
    pub source_method: String,
    pub source_line: String,
}

/// Broadcast payload: the triggering occurrence plus the summary for its kind.
///
/// Field names on the wire are fixed by the browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(rename = "ExceptionName")]
    pub kind: String,
    #[serde(rename = "ExceptionDate")]
    pub occurred_at: String,
    #[serde(rename = "ExceptionFile")]
    pub source_file: String,
    #[serde(rename = "ExceptionMethod")]
    pub source_method: String,
    #[serde(rename = "ExceptionLine")]
    pub source_line: String,
    #[serde(rename = "ExceptionSummary")]
    pub summary_text: String,
}

impl EnrichedEvent {
    pub fn new(event: ExceptionEvent, summary_text: String) -> Self {
        Self {
            kind: event.kind,
            occurred_at: event.occurred_at,
            source_file: event.source_file,
            source_method: event.source_method,
            source_line: event.source_line,
            summary_text,
        }
    }
}
