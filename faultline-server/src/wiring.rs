//! Build the relay's collaborators from configuration.

use std::sync::Arc;

use anyhow::Context;
use faultline_core::config::Backend;
use faultline_core::{
    channel_stream, FaultlineConfig, HttpEnrichmentClient, MemorySummaryCache, PgSummaryCache,
    PgTopicConsumer, PgTopicPublisher, StreamConsumer, StreamPublisher, SummaryCache,
    SummaryResolver,
};
use sqlx::PgPool;

use crate::http::HttpState;
use crate::subsystems::hub::BroadcastHub;

pub struct Components {
    pub pool: Option<PgPool>,
    pub cache: Arc<dyn SummaryCache>,
    pub resolver: SummaryResolver,
    pub consumer: Box<dyn StreamConsumer>,
    pub publisher: Arc<dyn StreamPublisher>,
    pub hub: Arc<BroadcastHub>,
}

impl Components {
    pub fn http_state(&self) -> Arc<HttpState> {
        Arc::new(HttpState {
            pool: self.pool.clone(),
            cache: self.cache.clone(),
            publisher: self.publisher.clone(),
            hub: self.hub.clone(),
        })
    }
}

/// Connect to the store and subscribe to the stream. Any failure here is fatal.
pub async fn build_components(config: &FaultlineConfig) -> anyhow::Result<Components> {
    let pool = match &config.database {
        Some(db) if config.needs_database() => {
            let pool = faultline_core::db::create_pool(db)
                .await
                .context("failed to connect to database")?;
            faultline_core::db::ensure_schema(&pool, &config.store.summary_table)
                .await
                .context("failed to prepare database schema")?;
            Some(pool)
        }
        _ => None,
    };

    let cache: Arc<dyn SummaryCache> = match (config.store.backend, &pool) {
        (Backend::Postgres, Some(pool)) => {
            Arc::new(PgSummaryCache::new(pool.clone(), &config.store.summary_table))
        }
        (Backend::Postgres, None) => anyhow::bail!("postgres store selected without a database"),
        (Backend::Memory, _) => Arc::new(MemorySummaryCache::new()),
    };

    let (consumer, publisher): (Box<dyn StreamConsumer>, Arc<dyn StreamPublisher>) =
        match (config.stream.backend, &pool) {
            (Backend::Postgres, Some(pool)) => {
                let consumer = PgTopicConsumer::subscribe(pool.clone(), &config.stream)
                    .await
                    .context("failed to subscribe to stream")?;
                let publisher = PgTopicPublisher::new(pool.clone(), config.stream.topic.clone());
                (
                    Box::new(consumer) as Box<dyn StreamConsumer>,
                    Arc::new(publisher) as Arc<dyn StreamPublisher>,
                )
            }
            (Backend::Postgres, None) => {
                anyhow::bail!("postgres stream selected without a database")
            }
            (Backend::Memory, _) => {
                let (publisher, consumer) =
                    channel_stream(config.stream.topic.clone(), config.stream.memory_capacity);
                (
                    Box::new(consumer) as Box<dyn StreamConsumer>,
                    Arc::new(publisher) as Arc<dyn StreamPublisher>,
                )
            }
        };

    let enrichment = HttpEnrichmentClient::new(&config.enrichment)
        .context("failed to build enrichment client")?;
    tracing::info!(
        store = cache.name(),
        stream = config.stream.backend.as_str(),
        topic = %config.stream.topic,
        enrichment_url = enrichment.url(),
        "Relay components ready"
    );

    let resolver = SummaryResolver::new(cache.clone(), Arc::new(enrichment));
    let hub = Arc::new(BroadcastHub::new(config.channel.shared_secret.clone()));

    Ok(Components {
        pool,
        cache,
        resolver,
        consumer,
        publisher,
        hub,
    })
}
