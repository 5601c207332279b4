use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{ChallengeMessage, NotificationMessage, RevocationMessage};

/// Classification of the `Twitch-Eventsub-Message-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Verification,
    Notification,
    Revocation,
    Unknown(String),
}

impl MessageType {
    /// Classifies a raw header value. Unrecognized values are preserved.
    pub fn from_header(value: &str) -> Self {
        match value {
            "webhook_callback_verification" => Self::Verification,
            "notification" => Self::Notification,
            "revocation" => Self::Revocation,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Label used for metrics and log fields.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::Notification => "notification",
            Self::Revocation => "revocation",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// A verified callback decoded into its typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Challenge(ChallengeMessage),
    Notification(NotificationMessage),
    Revocation(RevocationMessage),
}

/// Errors produced while decoding a verified callback body.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported message type: {0}")]
    UnknownMessageType(String),
    #[error("failed to parse {kind} payload: {source}")]
    Json {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Parses `body` according to `message_type`.
///
/// Callers must have verified the signature before handing the body over.
pub fn decode_callback(message_type: &MessageType, body: &[u8]) -> Result<Callback, DecodeError> {
    match message_type {
        MessageType::Verification => {
            parse::<ChallengeMessage>(message_type, body).map(Callback::Challenge)
        }
        MessageType::Notification => {
            parse::<NotificationMessage>(message_type, body).map(Callback::Notification)
        }
        MessageType::Revocation => {
            parse::<RevocationMessage>(message_type, body).map(Callback::Revocation)
        }
        MessageType::Unknown(value) => Err(DecodeError::UnknownMessageType(value.clone())),
    }
}

fn parse<T>(message_type: &MessageType, body: &[u8]) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|source| DecodeError::Json {
        kind: message_type.metric_label(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamEvent;
    use serde_json::json;

    #[test]
    fn classifies_known_and_unknown_headers() {
        assert_eq!(
            MessageType::from_header("webhook_callback_verification"),
            MessageType::Verification
        );
        assert_eq!(
            MessageType::from_header("notification"),
            MessageType::Notification
        );
        assert_eq!(
            MessageType::from_header("revocation"),
            MessageType::Revocation
        );
        assert_eq!(
            MessageType::from_header("Notification"),
            MessageType::Unknown("Notification".to_string())
        );
        assert_eq!(MessageType::from_header("").metric_label(), "unknown");
    }

    #[test]
    fn challenge_accepts_unparseable_created_at() {
        let body = json!({
            "challenge": "abc123",
            "subscription": {"id": "sub-1", "type": "stream.online"},
            "created_at": "sometime yesterday"
        })
        .to_string();

        let decoded =
            decode_callback(&MessageType::Verification, body.as_bytes()).expect("decode");
        match decoded {
            Callback::Challenge(message) => {
                assert_eq!(message.challenge, "abc123");
                assert_eq!(message.created_at.as_deref(), Some("sometime yesterday"));
            }
            other => panic!("unexpected callback: {other:?}"),
        }
    }

    #[test]
    fn decodes_challenge_verbatim() {
        let body = json!({
            "challenge": "pogchamp-kappa-360noscope-vohiyo",
            "subscription": {
                "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
                "status": "webhook_callback_verification_pending",
                "type": "stream.online",
                "version": "1",
                "cost": 1,
                "condition": {"broadcaster_user_id": "12826"},
                "transport": {"method": "webhook", "callback": "https://example.com/jagger/callback"},
                "created_at": "2019-11-16T10:11:12.634234626Z"
            }
        })
        .to_string();

        let decoded =
            decode_callback(&MessageType::Verification, body.as_bytes()).expect("decode");
        match decoded {
            Callback::Challenge(message) => {
                assert_eq!(message.challenge, "pogchamp-kappa-360noscope-vohiyo");
                assert_eq!(message.subscription.broadcaster_user_id(), Some("12826"));
            }
            other => panic!("unexpected callback: {other:?}"),
        }
    }

    #[test]
    fn decodes_stream_online_notification() {
        let body = json!({
            "subscription": {
                "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
                "type": "stream.online",
                "version": "1",
                "status": "enabled",
                "cost": 0,
                "condition": {"broadcaster_user_id": "1337"},
                "transport": {"method": "webhook", "callback": "https://example.com/jagger/callback"},
                "created_at": "2019-11-16T10:11:12.634234626Z"
            },
            "event": {
                "id": "9001",
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "cool_user",
                "broadcaster_user_name": "Cool_User",
                "type": "live",
                "started_at": "2020-10-11T10:11:12.123Z"
            }
        })
        .to_string();

        let decoded =
            decode_callback(&MessageType::Notification, body.as_bytes()).expect("decode");
        let Callback::Notification(message) = decoded else {
            panic!("expected notification");
        };
        assert_eq!(
            message.event,
            StreamEvent {
                id: Some("9001".to_string()),
                broadcaster_user_id: "1337".to_string(),
                broadcaster_user_login: "cool_user".to_string(),
                broadcaster_user_name: "Cool_User".to_string(),
                stream_type: Some("live".to_string()),
                started_at: Some("2020-10-11T10:11:12.123Z".to_string()),
                ..StreamEvent::default()
            }
        );
    }

    #[test]
    fn decodes_revocation() {
        let body = json!({
            "subscription": {
                "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
                "status": "authorization_revoked",
                "type": "stream.online",
                "version": "1",
                "condition": {"broadcaster_user_id": "1337"},
                "transport": {"method": "webhook", "callback": "https://example.com/jagger/callback"}
            }
        })
        .to_string();

        let decoded = decode_callback(&MessageType::Revocation, body.as_bytes()).expect("decode");
        let Callback::Revocation(message) = decoded else {
            panic!("expected revocation");
        };
        assert_eq!(message.subscription.status, "authorization_revoked");
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = decode_callback(&MessageType::Notification, b"{not json")
            .expect_err("should fail");
        assert!(matches!(err, DecodeError::Json { kind: "notification", .. }));

        let err = decode_callback(&MessageType::Verification, br#"{"subscription":{}}"#)
            .expect_err("challenge is required");
        assert!(matches!(err, DecodeError::Json { kind: "verification", .. }));
    }

    #[test]
    fn notification_without_event_is_rejected() {
        let err = decode_callback(
            &MessageType::Notification,
            br#"{"subscription":{"type":"stream.online"}}"#,
        )
        .expect_err("event is required");
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn unknown_message_type_is_rejected_without_parsing() {
        let err = decode_callback(&MessageType::Unknown("mystery".to_string()), b"not json")
            .expect_err("should fail");
        assert!(matches!(err, DecodeError::UnknownMessageType(value) if value == "mystery"));
    }
}
