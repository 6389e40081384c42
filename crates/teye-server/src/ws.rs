use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::middleware::{authenticate_key, parse_api_key_subprotocol};
use crate::state::AppState;

/// `GET /ws/pipeline/{session_id}` — streams `PipelineEvent`s for a session
/// to an observer (spec §3, §4.6, §6). Since a browser can't set arbitrary
/// headers on an upgrade request, the API key travels in the WebSocket
/// subprotocol (`api-key-<id>.<secret>`) instead of `X-API-Key`; the
/// selected subprotocol is echoed back so the client can confirm it.
pub async fn pipeline_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let requested = headers
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let Some((id, secret)) = requested.split(',').map(str::trim).find_map(parse_api_key_subprotocol) else {
        return (StatusCode::UNAUTHORIZED, "missing api-key subprotocol").into_response();
    };

    if authenticate_key(&state, &id, &secret).await.is_none() {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }

    let protocol = format!("api-key-{id}.{secret}");
    ws.protocols([protocol]).on_upgrade(move |socket| stream_pipeline(socket, state, session_id))
}

async fn stream_pipeline(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.bus.subscribe(&session_id).await;

    for event in subscription.replay.drain(..) {
        let Ok(text) = serde_json::to_string(&event) else { continue };
        if sender.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(session_id = %session_id, error = %err, "pipeline websocket read error");
                        return;
                    }
                }
            }
        }
    }
}
