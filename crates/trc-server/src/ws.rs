//! The runner WebSocket endpoint.
//!
//! The runner authenticates with a bearer credential at upgrade time, then
//! opens its session with a `HELLO` message. Server requests flow out through
//! the session's outbound channel; `RUNNER_RESULT` messages flow back into
//! the pending table. A superseded session's channel closes, which ends its
//! socket task.

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trc_bridge::protocol::{decode_client, encode_server, ClientMessage, ServerMessage};
use trc_core::{LedgerEvent, LedgerEventType};

/// `GET /v1/runner/ws` — upgrade the runner channel.
pub async fn runner_ws(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = bearer_token(header);
    let key = match token {
        Some(token) => state.store.resolve_api_key(token).await.ok().flatten(),
        None => None,
    };
    let Some(key) = key else {
        state
            .ledger(
                LedgerEvent::new(LedgerEventType::RunnerAuthFailed, "unknown", "unknown")
                    .with_payload(json!({ "reason": "invalid bearer token" })),
            )
            .await;
        warn!("runner authentication failed");
        return ApiError::unauthorized("runner unauthorized").into_response();
    };

    ws.on_upgrade(move |socket| {
        handle_runner_socket(state, key.org_id, key.user_id, socket)
    })
}

async fn handle_runner_socket(
    state: Arc<AppState>,
    org_id: String,
    user_id: String,
    socket: WebSocket,
) {
    let (mut sink, mut stream) = socket.split();

    // The first message must be HELLO { project_id }.
    let project_id = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_client(text.as_str()) {
                Ok(ClientMessage::Hello { project_id }) => break project_id,
                Ok(other) => {
                    warn!(?other, "expected HELLO as the first runner message");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "undecodable runner hello");
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        }
    };

    if state
        .store
        .project(project_id)
        .await
        .ok()
        .flatten()
        .is_none()
    {
        state
            .ledger(
                LedgerEvent::new(LedgerEventType::RunnerAuthFailed, org_id, user_id)
                    .with_payload(json!({ "reason": "unknown project", "project_id": project_id })),
            )
            .await;
        return;
    }

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);
    let session = state
        .registry
        .register(project_id, org_id, user_id, tx)
        .await;
    let session_id = session.session_id;
    // Keep only the registry's reference: when a newer HELLO supersedes this
    // session, dropping it there must close our outbound channel.
    drop(session);

    let ack = ServerMessage::HelloAck {
        runner_session_id: session_id,
    };
    match encode_server(&ack) {
        Ok(text) => {
            if sink.send(Message::Text(text.into())).await.is_err() {
                state.registry.remove(project_id, session_id).await;
                return;
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to encode HELLO_ACK");
            state.registry.remove(project_id, session_id).await;
            return;
        }
    }
    info!(%project_id, %session_id, "runner session established");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        let Ok(text) = encode_server(&message) else { continue };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Superseded by a newer HELLO: close this socket.
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match decode_client(text.as_str()) {
                        Ok(ClientMessage::Result(result)) => {
                            let delivered =
                                state.registry.dispatch_result(project_id, result).await;
                            if !delivered {
                                debug!("runner result had no waiter (stale or timed out)");
                            }
                        }
                        Ok(ClientMessage::Hello { .. }) => {
                            warn!("duplicate HELLO on open session; ignoring");
                        }
                        Err(err) => {
                            warn!(error = %err, "undecodable runner message");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "runner socket error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.remove(project_id, session_id).await;
    info!(%project_id, %session_id, "runner session closed");
}
