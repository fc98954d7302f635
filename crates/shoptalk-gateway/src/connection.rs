use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, Stream, StreamExt};
use tracing::{info, warn};

use shoptalk_types::events::ClientFrame;
use shoptalk_types::models::UserId;

use crate::registry::ConnectionRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket gets to send its auth frame before we close it.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection end to end: auth handshake, registry
/// registration, pump loop, teardown.
pub async fn handle_socket(socket: WebSocket, registry: ConnectionRegistry) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match wait_for_auth(&mut receiver).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to authenticate, closing");
            return;
        }
    };

    info!("User {} connected", user_id);

    let (conn_id, mut outbound) = registry.register(user_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued frames -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    match frame {
                        Some(payload) => {
                            if sender.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        // Sender gone: a newer connection for this user
                        // evicted ours. Close out gracefully.
                        None => {
                            let _ = sender.close().await;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Drain the client side. Sends ride the HTTP API, so inbound text after
    // auth carries nothing we act on.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(user_id, conn_id);
    info!("User {} disconnected", user_id);
}

/// Wait for the client to identify itself with an auth frame. Anything else
/// arriving first is dropped and the wait continues: unparseable text,
/// binary frames, and auth frames carrying the reserved or a negative id
/// all fall through until the timeout closes the socket.
async fn wait_for_auth<S>(receiver: &mut S) -> Option<UserId>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let timeout = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Auth { user_id }) if user_id > 0 => {
                        return Some(user_id);
                    }
                    Ok(ClientFrame::Auth { user_id }) => {
                        warn!("Ignoring auth frame with reserved id {}", user_id);
                    }
                    Err(e) => {
                        warn!("Bad frame before auth: {} -- raw: {}", e, log_preview(&text));
                    }
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Clamp a frame to its first 200 bytes for logging, backing up so the cut
/// never lands inside a multi-byte character.
fn log_preview(text: &str) -> &str {
    let mut end = text.len().min(200);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn text(body: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(body.to_string().into()))
    }

    #[tokio::test]
    async fn handshake_accepts_valid_auth() {
        let mut frames = stream::iter(vec![text(r#"{"type":"auth","userId":7}"#)]);
        assert_eq!(wait_for_auth(&mut frames).await, Some(7));
    }

    #[tokio::test]
    async fn junk_frames_before_auth_are_skipped() {
        let mut frames = stream::iter(vec![
            text("not json"),
            Ok(Message::Binary(vec![1, 2, 3].into())),
            text(r#"{"type":"chat","body":"hi"}"#),
            text(r#"{"type":"auth","userId":7}"#),
        ]);
        assert_eq!(wait_for_auth(&mut frames).await, Some(7));
    }

    #[tokio::test]
    async fn reserved_and_negative_ids_are_ignored() {
        let mut frames = stream::iter(vec![
            text(r#"{"type":"auth","userId":0}"#),
            text(r#"{"type":"auth","userId":-4}"#),
            text(r#"{"type":"auth","userId":9}"#),
        ]);
        assert_eq!(wait_for_auth(&mut frames).await, Some(9));
    }

    #[tokio::test]
    async fn multibyte_junk_does_not_break_the_handshake() {
        // Byte 200 of this frame lands inside the two-byte character.
        let junk = format!("{}\u{e9} tail", "x".repeat(199));
        let mut frames = stream::iter(vec![text(&junk), text(r#"{"type":"auth","userId":7}"#)]);
        assert_eq!(wait_for_auth(&mut frames).await, Some(7));
    }

    #[tokio::test]
    async fn closed_socket_before_auth_yields_none() {
        let mut frames = stream::iter(Vec::<Result<Message, axum::Error>>::new());
        assert_eq!(wait_for_auth(&mut frames).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_socket_times_out() {
        let mut frames = stream::pending::<Result<Message, axum::Error>>();
        assert_eq!(wait_for_auth(&mut frames).await, None);
    }

    #[test]
    fn log_preview_backs_up_to_char_boundary() {
        let text = format!("{}\u{e9}tail", "x".repeat(199));
        assert_eq!(log_preview(&text), "x".repeat(199));
        assert_eq!(log_preview("short"), "short");
    }
}
