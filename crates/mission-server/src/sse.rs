use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use mission_core::messages::{ServerMessage, encode_server_message};

use crate::error::AppError;
use crate::state::{AppState, ConnectionGuard};

/// GET /api/events/stream: SSE mirror of the WebSocket push.
///
/// Sends `state.snapshot` first, then one `agent.updated` per change. A
/// subscriber that lags ends the stream; the client's reconnect picks up a
/// fresh snapshot.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let Some(guard) = ConnectionGuard::try_acquire(&state.sse_subscriber_count, max_sse) else {
        tracing::warn!(max = max_sse, "SSE subscriber limit reached");
        return Err(AppError::Unavailable(
            "too many SSE subscribers".to_string(),
        ));
    };

    let sub = state.engine.subscribe().await?;
    let first = stream::once(async move { ServerMessage::StateSnapshot(sub.snapshot) });
    let updates = BroadcastStream::new(sub.events).map_while(move |result| {
        let _guard = &guard;
        match result {
            Ok(event) => Some(ServerMessage::AgentUpdated(event)),
            Err(e) => {
                tracing::warn!("SSE subscriber dropped: {e}");
                None
            },
        }
    });

    let stream = first.chain(updates).map(|msg| {
        let data = encode_server_message(&msg).unwrap_or_default();
        let event = SseEvent::default().event(msg.kind()).data(data);
        Ok(match &msg {
            ServerMessage::AgentUpdated(e) => event.id(e.id.to_string()),
            ServerMessage::StateSnapshot(_) => event,
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
