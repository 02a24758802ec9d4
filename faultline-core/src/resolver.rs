//! Summary resolution: cache lookup, enrichment on miss, append, enrich.
//!
//! There is no coalescing of concurrent misses. Two events of an unseen kind
//! that race past `lookup_latest` both call the enrichment service and both
//! append a record; lookup-latest-wins keeps reads consistent afterwards.

use std::sync::Arc;
use thiserror::Error;

use crate::cache::SummaryCache;
use crate::enrichment::{EnrichmentClient, EnrichmentError};
use crate::error::StorageError;
use crate::models::{EnrichedEvent, ExceptionEvent, RecordId, SummaryRecord};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    StorageUnavailable(#[from] StorageError),

    #[error("Enrichment unavailable: {0}")]
    EnrichmentUnavailable(#[from] EnrichmentError),
}

/// How a summary was obtained, for logging by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Hit,
    Miss { record_id: RecordId },
}

#[derive(Clone)]
pub struct SummaryResolver {
    cache: Arc<dyn SummaryCache>,
    enrichment: Arc<dyn EnrichmentClient>,
}

impl SummaryResolver {
    pub fn new(cache: Arc<dyn SummaryCache>, enrichment: Arc<dyn EnrichmentClient>) -> Self {
        Self { cache, enrichment }
    }

    pub async fn resolve(&self, event: ExceptionEvent) -> Result<EnrichedEvent, ResolveError> {
        self.resolve_with_outcome(event).await.map(|(enriched, _)| enriched)
    }

    /// Location fields always come from `event`; only the summary text is cached.
    pub async fn resolve_with_outcome(
        &self,
        event: ExceptionEvent,
    ) -> Result<(EnrichedEvent, Resolution), ResolveError> {
        if let Some(cached) = self.cache.lookup_latest(&event.kind).await? {
            tracing::debug!(kind = %event.kind, "Summary found in cache");
            return Ok((EnrichedEvent::new(event, cached.summary_text), Resolution::Hit));
        }

        tracing::info!(
            kind = %event.kind,
            provider = self.enrichment.name(),
            "Summary not cached, requesting enrichment"
        );
        let summary_text = self.enrichment.summarize(&event.kind).await?;

        let record = SummaryRecord::from_event(&event, summary_text);
        let record_id = self.cache.append(&record).await?;
        tracing::info!(
            kind = %event.kind,
            record_id = %record_id,
            store = self.cache.name(),
            "Summary cached"
        );

        Ok((
            EnrichedEvent::new(event, record.summary_text),
            Resolution::Miss { record_id },
        ))
    }
}
