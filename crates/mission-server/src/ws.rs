use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use mission_core::events::ActivityEvent;
use mission_core::messages::{ServerMessage, encode_server_message};

use crate::engine::EngineHandle;
use crate::error::AppError;
use crate::state::{AppState, ConnectionGuard};

type WsSender = SplitSink<WebSocket, Message>;

/// GET /ws: push channel. The first frame is always `state.snapshot`,
/// followed by one `agent.updated` frame per accepted change.
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let max_ws = state.config.limits.max_ws_connections;
    let Some(guard) = ConnectionGuard::try_acquire(&state.ws_connection_count, max_ws) else {
        tracing::warn!(max = max_ws, "WS connection limit reached");
        return Err(AppError::Unavailable(
            "too many WebSocket connections".to_string(),
        ));
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, guard)))
}

async fn handle_socket(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Ok(sub) = state.engine.subscribe().await else {
        return;
    };
    if !send(&mut ws_sender, &ServerMessage::StateSnapshot(sub.snapshot)).await {
        return;
    }
    let mut events = sub.events;
    tracing::debug!("WS client connected");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if !send(&mut ws_sender, &ServerMessage::AgentUpdated(event)).await {
                        break;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WS client lagged, re-sending snapshot");
                    let Some(snapshot) = resync(&state.engine, &mut events).await else {
                        break;
                    };
                    if !send(&mut ws_sender, &snapshot).await {
                        break;
                    }
                },
                Err(RecvError::Closed) => break,
            },
            incoming = ws_receiver.next() => match incoming {
                // Clients have nothing to say; only watch for the close.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
        }
    }

    let _ = ws_sender.close().await;
    tracing::debug!("WS client disconnected");
}

/// Swap a lagged receiver for a fresh subscription and return its snapshot.
async fn resync(
    engine: &EngineHandle,
    events: &mut broadcast::Receiver<ActivityEvent>,
) -> Option<ServerMessage> {
    let sub = engine.subscribe().await.ok()?;
    *events = sub.events;
    Some(ServerMessage::StateSnapshot(sub.snapshot))
}

/// Encode and send one message. Returns false once the peer is gone.
async fn send(ws_sender: &mut WsSender, msg: &ServerMessage) -> bool {
    let text = match encode_server_message(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(kind = msg.kind(), "Failed to encode message: {e}");
            return true;
        },
    };
    ws_sender.send(Message::Text(text.into())).await.is_ok()
}
