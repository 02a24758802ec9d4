//! Wire format of exception records on the stream.
//!
//! A record is five `|`-separated fields in a fixed order:
//! `occurredAt|kind|sourceFile|sourceMethod|sourceLine`. Field contents are
//! passed through untouched; only the field count is checked.

use crate::error::DecodeError;
use crate::models::ExceptionEvent;

pub const FIELD_DELIMITER: char = '|';
pub const FIELD_COUNT: usize = 5;

pub fn decode(raw: &str) -> Result<ExceptionEvent, DecodeError> {
    let fields: Vec<&str> = raw.split(FIELD_DELIMITER).collect();

    match fields.as_slice() {
        [occurred_at, kind, source_file, source_method, source_line] => Ok(ExceptionEvent {
            occurred_at: occurred_at.to_string(),
            kind: kind.to_string(),
            source_file: source_file.to_string(),
            source_method: source_method.to_string(),
            source_line: source_line.to_string(),
        }),
        _ => Err(DecodeError {
            expected: FIELD_COUNT,
            actual: fields.len(),
        }),
    }
}

/// Decode a raw stream payload. Invalid UTF-8 is replaced, not rejected.
pub fn decode_bytes(payload: &[u8]) -> Result<ExceptionEvent, DecodeError> {
    decode(&String::from_utf8_lossy(payload))
}

pub fn encode(event: &ExceptionEvent) -> String {
    let delimiter = FIELD_DELIMITER.to_string();
    [
        event.occurred_at.as_str(),
        event.kind.as_str(),
        event.source_file.as_str(),
        event.source_method.as_str(),
        event.source_line.as_str(),
    ]
    .join(&delimiter)
}
