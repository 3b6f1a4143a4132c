use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use prosopon_core::{ControlCommand, UiEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Shared state for the gateway server.
#[derive(Clone)]
struct AppState {
    /// Feeds inbound control messages into the command loop's queue.
    command_tx: mpsc::Sender<ControlCommand>,
    /// UI event fan-out; each connection holds its own subscription.
    events: broadcast::Sender<UiEvent>,
    /// Number of active WebSocket connections.
    active_ws: Arc<AtomicUsize>,
}

/// The visualization HTTP + WebSocket server.
///
/// - `GET /health`: liveness check
/// - `GET /ws`: bidirectional stream, outbound [`UiEvent`] JSON and inbound
///   `{action, ...}` control messages
pub struct GatewayServer {
    command_tx: mpsc::Sender<ControlCommand>,
    events: broadcast::Sender<UiEvent>,
    active_ws: Arc<AtomicUsize>,
    host: String,
    port: u16,
}

impl GatewayServer {
    /// `command_tx` feeds the command loop; `events` is the broadcast
    /// channel the control loops publish UI events on.
    pub fn new(
        command_tx: mpsc::Sender<ControlCommand>,
        events: broadcast::Sender<UiEvent>,
        host: &str,
        port: u16,
    ) -> Self {
        Self {
            command_tx,
            events,
            active_ws: Arc::new(AtomicUsize::new(0)),
            host: host.to_string(),
            port,
        }
    }

    /// Active WebSocket connection count (shared with handlers).
    pub fn active_connections(&self) -> Arc<AtomicUsize> {
        self.active_ws.clone()
    }

    /// Bind and serve. Spawns a background task and returns its handle;
    /// a bind failure is the one startup error that aborts the process,
    /// reported through the handle.
    pub fn start(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        let state = AppState {
            command_tx: self.command_tx.clone(),
            events: self.events.clone(),
            active_ws: self.active_ws.clone(),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/ws", get(ws_upgrade))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr = format!("{}:{}", self.host, self.port);
        tokio::spawn(async move {
            tracing::info!("Gateway listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
            Ok(())
        })
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let count = state.active_ws.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!("Viz client {} connected ({} active)", connection_id, count);

    let (mut sink, mut stream) = socket.split();
    let mut events = state.events.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A slow client misses frames rather than
                        // stalling the producer.
                        tracing::debug!(
                            "Viz client {} lagged, skipped {} events",
                            connection_id,
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlCommand>(&text) {
                            Ok(cmd) => {
                                if state.command_tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!("Dropping malformed control message: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("Viz client {} socket error: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    let count = state.active_ws.fetch_sub(1, Ordering::Relaxed) - 1;
    tracing::info!(
        "Viz client {} disconnected ({} active)",
        connection_id,
        count
    );
}
