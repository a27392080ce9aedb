//! Downstream WebSocket Server
//!
//! Accepts relay clients on a single upgrade path. Each connection gets a
//! bounded outbound queue drained by one writer task, and a read loop that
//! feeds inbound frames to its [`ClientSession`].
//!
//! ```text
//!  hub ──try_send──► queue ──► writer task ──► socket
//!                                               │
//!  session ◄── handle_frame ◄── read loop ◄─────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ClientHandle, ClientSession, SubscriptionHub};
use crate::domain::protocol::ServerMessage;
use crate::infrastructure::config::ServerSettings;
use crate::domain::subscription::ConsumerId;
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Errors
// =============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Relay Server
// =============================================================================

struct RelayState {
    hub: Arc<SubscriptionHub>,
    queue_capacity: usize,
    connected_clients: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

/// WebSocket listener for relay clients.
pub struct RelayServer {
    addr: SocketAddr,
    ws_path: String,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a relay server.
    #[must_use]
    pub fn new(
        settings: &ServerSettings,
        hub: Arc<SubscriptionHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr: settings.listen_addr,
            ws_path: settings.ws_path.clone(),
            state: Arc::new(RelayState {
                hub,
                queue_capacity: settings.client_queue_capacity,
                connected_clients: Arc::new(AtomicUsize::new(0)),
                cancel,
            }),
        }
    }

    /// Counter of currently connected clients.
    #[must_use]
    pub fn connected_clients(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.state.connected_clients)
    }

    /// Router serving the upgrade path.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.ws_path, get(upgrade_handler))
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), RelayServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| RelayServerError::BindFailed(self.addr, e.to_string()))?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError::ServerFailed` on a fatal server error.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), RelayServerError> {
        let addr = listener.local_addr().unwrap_or(self.addr);
        tracing::info!(addr = %addr, path = %self.ws_path, "Relay server listening");

        let cancel = self.state.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("addr", &self.addr)
            .field("ws_path", &self.ws_path)
            .field(
                "connected_clients",
                &self.state.connected_clients.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Handling
// =============================================================================

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (tx, rx) = mpsc::channel::<ServerMessage>(state.queue_capacity);
    let client = Arc::new(ClientHandle::with_random_id(tx));
    let session = ClientSession::new(Arc::clone(&state.hub), Arc::clone(&client));
    let client_id = session.client_id();

    #[allow(clippy::cast_precision_loss)]
    metrics::set_clients((state.connected_clients.fetch_add(1, Ordering::Relaxed) + 1) as f64);
    tracing::info!(client_id, "Client connected");

    let (sender, mut receiver) = socket.split();
    let writer = tokio::spawn(drain_outbound(client_id, rx, sender));

    // Only the read side decides that the client is gone
    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => session.handle_frame(text.as_bytes()),
                Some(Ok(Message::Binary(bytes))) => session.handle_frame(&bytes),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(client_id, error = %e, "Client socket error");
                    break;
                }
            },
        }
    }

    writer.abort();
    let released = session.close();

    #[allow(clippy::cast_precision_loss)]
    metrics::set_clients((state.connected_clients.fetch_sub(1, Ordering::Relaxed) - 1) as f64);
    tracing::info!(client_id, released, "Client disconnected");
}

/// Write queued frames to the socket until the queue closes.
///
/// A failed write drops that frame and the writer moves on. Returns the
/// number of frames that could not be written.
async fn drain_outbound<S>(
    client_id: ConsumerId,
    mut rx: mpsc::Receiver<ServerMessage>,
    mut sink: S,
) -> usize
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut failed = 0;
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(message.into_text().into())).await {
            if failed == 0 {
                tracing::warn!(client_id, error = %e, "Failed to write to client");
            } else {
                tracing::debug!(client_id, error = %e, "Failed to write to client");
            }
            metrics::record_messages_dropped(DropReason::WriteFailed, 1);
            failed += 1;
        }
    }
    let _ = sink.close().await;
    failed
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::io;

    use futures_util::sink;

    use super::*;
    use crate::domain::protocol::Notice;

    #[tokio::test]
    async fn failed_writes_are_counted_and_draining_continues() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let broken = Box::pin(sink::unfold((), move |(), _: Message| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(io::Error::from(io::ErrorKind::BrokenPipe)) }
        }));

        let (tx, rx) = mpsc::channel(8);
        for pair in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
            tx.try_send(ServerMessage::Notice(Notice::InvalidInstrument(pair.into())))
                .unwrap();
        }
        drop(tx);

        assert_eq!(drain_outbound(7, rx, broken).await, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn writer_stays_alive_after_a_failed_write() {
        let (tx, rx) = mpsc::channel(8);
        let broken = Box::pin(sink::unfold((), |(), _: Message| async {
            Err::<(), _>(io::Error::from(io::ErrorKind::BrokenPipe))
        }));
        let writer = tokio::spawn(drain_outbound(7, rx, broken));

        tx.send(ServerMessage::Notice(Notice::ParseError("eof".into())))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        // Queue still accepts frames while the client is connected
        assert!(!writer.is_finished());
        tx.send(ServerMessage::Notice(Notice::ParseError("eof".into())))
            .await
            .unwrap();

        drop(tx);
        assert_eq!(writer.await.unwrap(), 2);
    }
}
