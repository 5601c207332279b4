use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EventSub subscription type watched by the bot.
pub const STREAM_ONLINE_TYPE: &str = "stream.online";
/// Version of the `stream.online` subscription the bot registers.
pub const STREAM_ONLINE_VERSION: &str = "1";
/// Transport method used for callback-based delivery.
pub const WEBHOOK_METHOD: &str = "webhook";

/// Provider-side registration that causes notifications to be delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing)]
    pub cost: i64,
    #[serde(default)]
    pub condition: HashMap<String, String>,
    #[serde(default, skip_serializing)]
    pub status: String,
    #[serde(default)]
    pub transport: SubscriptionTransport,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Builds a `stream.online` webhook subscription request for `broadcaster_id`.
    pub fn stream_online_webhook(
        broadcaster_id: impl Into<String>,
        callback: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let mut condition = HashMap::new();
        condition.insert("broadcaster_user_id".to_string(), broadcaster_id.into());
        Self {
            kind: STREAM_ONLINE_TYPE.to_string(),
            version: STREAM_ONLINE_VERSION.to_string(),
            condition,
            transport: SubscriptionTransport {
                method: WEBHOOK_METHOD.to_string(),
                callback: callback.into(),
                secret: secret.into(),
                session_id: String::new(),
            },
            ..Self::default()
        }
    }

    /// Returns the broadcaster the subscription is scoped to, if any.
    pub fn broadcaster_user_id(&self) -> Option<&str> {
        self.condition.get("broadcaster_user_id").map(String::as_str)
    }

    /// Returns `true` for `stream.online` subscriptions scoped to `broadcaster_id`.
    pub fn watches_stream_online(&self, broadcaster_id: &str) -> bool {
        self.kind == STREAM_ONLINE_TYPE && self.broadcaster_user_id() == Some(broadcaster_id)
    }

    /// Returns `true` when the provider still considers the subscription usable.
    pub fn is_live(&self) -> bool {
        matches!(
            self.status.as_str(),
            "enabled" | "webhook_callback_verification_pending"
        )
    }
}

/// Delivery settings of a subscription. Webhook fields and websocket fields are
/// mutually exclusive on the provider side; unused ones stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTransport {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub callback: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
}

/// Event payload carried by a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub followed_at: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl StreamEvent {
    /// Login used to build channel links, preferring the broadcaster fields.
    pub fn channel_login(&self) -> &str {
        if self.broadcaster_user_login.is_empty() {
            &self.user_login
        } else {
            &self.broadcaster_user_login
        }
    }
}

/// Handshake payload answered to activate a webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengeMessage {
    pub challenge: String,
    #[serde(default)]
    pub subscription: Subscription,
    /// Passed through as sent; the handshake never interprets it.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Payload delivered when a subscribed event fires.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationMessage {
    #[serde(default)]
    pub subscription: Subscription,
    pub event: StreamEvent,
}

/// Payload delivered when the provider revokes a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevocationMessage {
    pub subscription: Subscription,
}

/// Channel metadata used to enrich announcements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelInformation {
    pub broadcaster_id: String,
    #[serde(default)]
    pub broadcaster_login: String,
    #[serde(default)]
    pub broadcaster_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
}
