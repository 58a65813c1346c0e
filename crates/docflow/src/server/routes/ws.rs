//! WebSocket push channel
//!
//! `GET /process/ws/:user_id?token=JWT`. The token's owner must equal
//! `user_id`; otherwise the socket is closed with code 4001 right after the
//! upgrade. The hub owns the sending half of the channel, so when it prunes
//! the channel or shuts down the socket loop ends too.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::notifications::MpscPushChannel;
use crate::server::state::AppState;
use crate::types::{OwnerId, PushEvent};

/// Close code for refused credentials
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// GET /process/ws/:user_id - Upgrade to a push channel
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<ConnectParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, OwnerId(user_id), params.token))
}

/// Check that the credential may listen on `owner`'s channel
fn authorize(auth: &dyn Authenticator, owner: OwnerId, token: Option<&str>) -> Result<(), String> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "Missing token".to_string())?;

    let validation = auth.validate(token);
    match (validation.valid, validation.user_id) {
        (true, Some(id)) if id == owner => Ok(()),
        (true, _) => Err("Token does not match user".to_string()),
        (false, _) => Err(validation
            .error
            .unwrap_or_else(|| "Invalid token".to_string())),
    }
}

async fn send_event(socket: &mut WebSocket, event: &PushEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!("Could not encode push event: {}", e);
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, owner: OwnerId, token: Option<String>) {
    if let Err(reason) = authorize(state.authenticator().as_ref(), owner, token.as_deref()) {
        tracing::warn!("Refusing push channel for owner {}: {}", owner, reason);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNAUTHORIZED,
                reason: Cow::Owned(reason),
            })))
            .await;
        return;
    }

    if !send_event(&mut socket, &PushEvent::connected(owner)).await {
        return;
    }

    let (channel, mut rx) = MpscPushChannel::new(state.config().notifications.channel_capacity);
    let hub = Arc::clone(state.hub());
    let id = hub.register(owner, Arc::new(channel));

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if !send_event(&mut socket, &event).await {
                        break;
                    }
                }
                // Pruned by the hub or hub shut down
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) if text.trim() == "ping" => {
                    if !send_event(&mut socket, &PushEvent::ping("pong")).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(owner, id);
    tracing::debug!("Push channel {} closed for owner {}", id, owner);
}
