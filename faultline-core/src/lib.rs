pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod resolver;
pub mod stream;

pub use cache::{MemorySummaryCache, PgSummaryCache, SummaryCache};
pub use codec::{decode, decode_bytes, encode};
pub use config::FaultlineConfig;
pub use enrichment::{EnrichmentClient, EnrichmentError, HttpEnrichmentClient};
pub use error::{DecodeError, FaultlineError, StorageError};
pub use models::{EnrichedEvent, ExceptionEvent, RecordId, SummaryRecord};
pub use resolver::{Resolution, ResolveError, SummaryResolver};
pub use stream::{
    channel_stream, ChannelConsumer, ChannelPublisher, PgTopicConsumer, PgTopicPublisher,
    StreamConsumer, StreamError, StreamMessage, StreamPublisher,
};
