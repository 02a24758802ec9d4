//! Client channel: WebSocket endpoint that registers each socket with the hub.
//!
//! One task per socket runs a single select loop: it drains the connection's
//! outbound queue into the socket and reads inbound frames. When either side
//! ends, the connection is unregistered.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::subsystems::hub::BroadcastHub;

pub fn build_channel_router(hub: Arc<BroadcastHub>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(hub)
}

/// Serve the channel on an already-bound listener.
pub async fn serve_channel(
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = build_channel_router(hub.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Client channel shutting down...");
            hub.close_all();
        })
        .await?;

    Ok(())
}

/// Spawn a server future. If it fails, every other subsystem is told to stop and
/// the error is kept for the caller's exit status.
pub fn spawn_supervised<F>(
    name: &'static str,
    server: F,
    shutdown_tx: broadcast::Sender<()>,
) -> JoinHandle<anyhow::Result<()>>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = server.await;
        if let Err(e) = &result {
            tracing::error!(server = name, error = %e, "Server failed, shutting down");
            let _ = shutdown_tx.send(());
        }
        result
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<BroadcastHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut session = hub.register();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;
            outbound = session.outbound.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text.to_string())).await {
                        tracing::warn!(connection_id = %session.id, error = %e, "Socket write failed");
                        break;
                    }
                }
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    hub.handle_inbound(session.id, &text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %session.id, error = %e, "Socket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(session.id);
    let _ = sender.close().await;
}
