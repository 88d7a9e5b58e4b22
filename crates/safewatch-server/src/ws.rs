//! WebSocket presence channel.
//!
//! Each socket gets a fresh [`ConnectionId`] and an outbound queue in the
//! [`ChannelPublisher`](crate::publisher::ChannelPublisher). Client messages
//! drive authenticate / acknowledge; closing the socket is the disconnect.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use safewatch_hub::Publisher;
use safewatch_shared::events::{ClientMessage, PushEvent, RequestFailed};
use safewatch_shared::ConnectionId;

use crate::api::AppState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnectionId::new();
    let mut outbound = state.publisher.open(conn, state.config.connection_buffer);
    let (mut sink, mut stream) = socket.split();
    debug!(conn = %conn, "Presence connection opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(conn = %conn, error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_client_message(&state, conn, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %conn, error = %e, "Presence socket error");
                break;
            }
        }
    }

    state.hub.disconnect(conn).await;
    state.publisher.close(conn);
    writer.abort();
    debug!(conn = %conn, "Presence connection closed");
}

pub(crate) async fn handle_client_message(state: &AppState, conn: ConnectionId, text: &str) {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            reject(state, conn, "unknown", e.to_string());
            return;
        }
    };

    match message {
        ClientMessage::Authenticate { user_id } => {
            // the hub replies with authenticated / authentication_failed itself
            let _ = state.hub.authenticate(conn, &user_id).await;
        }
        ClientMessage::Acknowledge { user_id, location } => {
            if let Err(e) = state.hub.acknowledge(&user_id, location).await {
                reject(state, conn, "acknowledge", e.to_string());
            }
        }
    }
}

fn reject(state: &AppState, conn: ConnectionId, action: &str, error: String) {
    debug!(conn = %conn, action, error = %error, "Presence request rejected");
    let event = PushEvent::RequestFailed(RequestFailed {
        action: action.to_string(),
        error,
    });
    if let Err(e) = state.publisher.send(conn, &event) {
        debug!(conn = %conn, error = %e, "Could not deliver rejection");
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::ServerConfig;
    use safewatch_shared::UserId;

    fn connect(state: &AppState) -> (ConnectionId, mpsc::Receiver<PushEvent>) {
        let conn = ConnectionId::new();
        let rx = state.publisher.open(conn, 16);
        (conn, rx)
    }

    #[tokio::test]
    async fn test_authenticate_over_channel() {
        let state = AppState::new(ServerConfig::default());
        state
            .hub
            .register(UserId::from("alice"), "Alice".into())
            .await
            .unwrap();
        let (conn, mut rx) = connect(&state);

        handle_client_message(
            &state,
            conn,
            r#"{"event":"authenticate","data":{"userId":"alice"}}"#,
        )
        .await;
        assert_eq!(rx.try_recv().unwrap().name(), "authenticated");
        assert_eq!(state.hub.lookup(&UserId::from("alice")).await, Some(conn));
    }

    #[tokio::test]
    async fn test_rejections_stay_on_the_connection() {
        let state = AppState::new(ServerConfig::default());
        let (conn, mut rx) = connect(&state);
        let (_other, mut other_rx) = connect(&state);

        handle_client_message(
            &state,
            conn,
            r#"{"event":"authenticate","data":{"userId":"ghost"}}"#,
        )
        .await;
        assert_eq!(rx.try_recv().unwrap().name(), "authentication_failed");

        handle_client_message(
            &state,
            conn,
            r#"{"event":"acknowledge","data":{"userId":"ghost"}}"#,
        )
        .await;
        let PushEvent::RequestFailed(failed) = rx.try_recv().unwrap() else {
            panic!("expected request_failed");
        };
        assert_eq!(failed.action, "acknowledge");

        handle_client_message(&state, conn, "garbage").await;
        assert_eq!(rx.try_recv().unwrap().name(), "request_failed");

        assert!(other_rx.try_recv().is_err());
        assert_eq!(state.hub.lookup(&UserId::from("ghost")).await, None);
    }

    #[tokio::test]
    async fn test_disconnect_announces_offline() {
        let state = AppState::new(ServerConfig::default());
        for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
            state
                .hub
                .register(UserId::from(id), name.into())
                .await
                .unwrap();
        }
        state
            .hub
            .add_contact(&UserId::from("alice"), &UserId::from("bob"))
            .await
            .unwrap();

        let (bob, mut bob_rx) = connect(&state);
        let (alice, _alice_rx) = connect(&state);
        handle_client_message(&state, bob, r#"{"event":"authenticate","data":{"userId":"bob"}}"#)
            .await;
        handle_client_message(
            &state,
            alice,
            r#"{"event":"authenticate","data":{"userId":"alice"}}"#,
        )
        .await;

        state.hub.disconnect(alice).await;
        state.publisher.close(alice);

        let names: Vec<&str> = std::iter::from_fn(|| bob_rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec!["authenticated", "contact_online", "contact_offline"]
        );
    }
}
