//! Broadcast hub: the set of live client connections.
//!
//! Each connection owns an unbounded FIFO queue drained by exactly one socket
//! writer, so successive broadcasts reach a given client in call order. The
//! registry is shared between the accept path (register/unregister) and the
//! ingestion path (broadcast) behind a `RwLock`; the lock is never held across
//! an `.await`.
//!
//! Queues are unbounded: a client that stops reading grows its queue until the
//! socket write fails.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use faultline_core::EnrichedEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The only inbound client message the hub interprets.
pub const TOKEN_REQUEST: &str = "get_key";

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

struct ClientConnection {
    tx: mpsc::UnboundedSender<Arc<str>>,
}

impl ClientConnection {
    fn state(&self) -> ConnectionState {
        if self.tx.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }
}

/// Handle given to the socket task that owns a registered connection.
pub struct ClientSession {
    pub id: ConnectionId,
    pub outbound: mpsc::UnboundedReceiver<Arc<str>>,
}

/// Per-call delivery counts, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: usize,
}

pub struct BroadcastHub {
    connections: RwLock<HashMap<ConnectionId, ClientConnection>>,
    shared_secret: String,
}

impl BroadcastHub {
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            shared_secret: shared_secret.into(),
        }
    }

    pub fn register(&self) -> ClientSession {
        let id = Uuid::new_v4();
        let (tx, outbound) = mpsc::unbounded_channel();
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ClientConnection { tx });
        tracing::info!(connection_id = %id, "Client connected");
        ClientSession { id, outbound }
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Answer an inbound client message. Returns `true` if it was understood.
    ///
    /// A token request queues the shared secret on that connection only, behind
    /// any events already queued for it.
    pub fn handle_inbound(&self, id: ConnectionId, message: &str) -> bool {
        if message != TOKEN_REQUEST {
            tracing::debug!(connection_id = %id, "Ignoring inbound client message");
            return false;
        }

        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        match connections.get(&id) {
            Some(conn) => conn.tx.send(Arc::from(self.shared_secret.as_str())).is_ok(),
            None => false,
        }
    }

    /// Push `event` to every open connection. Delivery failures are local to
    /// the failing connection, which is dropped from the registry.
    pub fn broadcast(&self, event: &EnrichedEvent) -> BroadcastReport {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize enriched event");
                return BroadcastReport::default();
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
            for (id, conn) in connections.iter() {
                if conn.state() == ConnectionState::Closed {
                    dead.push(*id);
                    continue;
                }
                match conn.tx.send(Arc::clone(&payload)) {
                    Ok(()) => delivered += 1,
                    Err(_) => {
                        tracing::warn!(connection_id = %id, "Delivery failed, dropping client");
                        dead.push(*id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
            for id in &dead {
                connections.remove(id);
            }
        }

        BroadcastReport {
            delivered,
            removed: dead.len(),
        }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every connection's queue so socket tasks wind down on shutdown.
    pub fn close_all(&self) {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        let count = connections.len();
        connections.clear();
        if count > 0 {
            tracing::info!(count, "Closed all client connections");
        }
    }
}
