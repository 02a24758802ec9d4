//! Ingestion loop: stream message → decode → resolve → broadcast.
//!
//! Messages are handled strictly one at a time, so message N+1 is not decoded
//! before message N has been broadcast. A failure on one message is logged and
//! the message is skipped; the stream position is committed either way.

use std::sync::Arc;
use std::time::Duration;

use faultline_core::{decode_bytes, DecodeError, ResolveError, StreamConsumer, SummaryResolver};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::subsystems::hub::{BroadcastHub, BroadcastReport};

/// Pause before polling again after the stream itself reports an error.
const STREAM_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    StreamClosed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub broadcast: u64,
    pub skipped: u64,
}

/// Handle one raw payload end to end.
pub async fn process_message(
    payload: &[u8],
    resolver: &SummaryResolver,
    hub: &BroadcastHub,
) -> Result<BroadcastReport, IngestError> {
    let event = decode_bytes(payload)?;
    let enriched = resolver.resolve(event).await?;
    Ok(hub.broadcast(&enriched))
}

pub async fn run_ingestion_loop(
    mut consumer: Box<dyn StreamConsumer>,
    resolver: SummaryResolver,
    hub: Arc<BroadcastHub>,
    mut shutdown: broadcast::Receiver<()>,
) -> (StopReason, IngestStats) {
    let mut stats = IngestStats::default();
    tracing::info!(topic = consumer.topic(), "Ingestion loop started");

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!("Ingestion loop shutting down...");
                break StopReason::Shutdown;
            }
            next = consumer.next_message() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::warn!("Stream ended");
                break StopReason::StreamClosed;
            }
            Err(e) => {
                tracing::error!(error = %e, "Stream read failed");
                tokio::time::sleep(STREAM_ERROR_PAUSE).await;
                continue;
            }
        };

        stats.received += 1;
        tracing::debug!(
            offset = message.offset,
            value = %String::from_utf8_lossy(&message.payload),
            "Message received"
        );

        match process_message(&message.payload, &resolver, &hub).await {
            Ok(report) => {
                stats.broadcast += 1;
                tracing::info!(
                    offset = message.offset,
                    delivered = report.delivered,
                    removed = report.removed,
                    "Event broadcast"
                );
            }
            Err(e) => {
                stats.skipped += 1;
                tracing::warn!(offset = message.offset, error = %e, "Skipping message");
            }
        }

        if let Err(e) = consumer.commit(&message).await {
            tracing::warn!(offset = message.offset, error = %e, "Failed to commit stream position");
        }
    };

    tracing::info!(
        received = stats.received,
        broadcast = stats.broadcast,
        skipped = stats.skipped,
        "Ingestion loop stopped"
    );
    (reason, stats)
}

/// Spawn the ingestion loop as a supervised task.
pub fn spawn_ingestion(
    consumer: Box<dyn StreamConsumer>,
    resolver: SummaryResolver,
    hub: Arc<BroadcastHub>,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<(StopReason, IngestStats)> {
    tokio::spawn(run_ingestion_loop(consumer, resolver, hub, shutdown))
}

/// Wait for the ingestion task. Anything other than a requested shutdown is a
/// failure: it is logged, every other subsystem is told to stop, and an error
/// is returned so the process exits non-zero.
pub async fn supervise(
    handle: JoinHandle<(StopReason, IngestStats)>,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<IngestStats> {
    match handle.await {
        Ok((StopReason::Shutdown, stats)) => Ok(stats),
        Ok((StopReason::StreamClosed, stats)) => {
            tracing::error!("Ingestion stopped because the stream closed");
            let _ = shutdown_tx.send(());
            Err(anyhow::anyhow!(
                "ingestion stopped unexpectedly after {} messages",
                stats.received
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion task failed");
            let _ = shutdown_tx.send(());
            Err(anyhow::anyhow!("ingestion task failed: {}", e))
        }
    }
}
