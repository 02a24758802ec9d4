pub mod event;
pub mod summary;

pub use event::{EnrichedEvent, ExceptionEvent};
pub use summary::{RecordId, SummaryRecord};
