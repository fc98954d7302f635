use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// Frames sent from client to server over the WebSocket.
///
/// The protocol is deliberately small: the only meaningful inbound frame is
/// the authentication handshake. Everything the server pushes outbound is the
/// JSON encoding of a [`crate::models::Message`], sent verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// First frame on every connection: `{"type":"auth","userId":<integer>}`.
    #[serde(rename_all = "camelCase")]
    Auth { user_id: UserId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_frame_parses_wire_shape() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"auth","userId":7}"#).unwrap();
        let ClientFrame::Auth { user_id } = frame;
        assert_eq!(user_id, 7);
    }

    #[test]
    fn auth_frame_serializes_wire_shape() {
        let json = serde_json::to_string(&ClientFrame::Auth { user_id: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"auth","userId":3}"#);
    }

    #[test]
    fn unknown_frames_do_not_parse() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"chat","body":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }
}
