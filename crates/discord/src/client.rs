use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::Embed;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;
use twilight_util::builder::embed::{EmbedBuilder, EmbedFieldBuilder};

const EMBED_COLOR: u32 = 0x33ff33;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends messages to the audience and admin channel sets.
#[derive(Clone)]
pub struct DiscordClient {
    http: Arc<HttpClient>,
    channel_ids: Vec<Id<ChannelMarker>>,
    admin_channel_ids: Vec<Id<ChannelMarker>>,
}

impl DiscordClient {
    /// Builds a client for the given bot token and channel sets.
    pub fn new(
        bot_token: impl Into<String>,
        channel_ids: &[String],
        admin_channel_ids: &[String],
    ) -> Result<Self, ChatError> {
        let http = HttpClient::builder()
            .token(bot_token.into())
            .timeout(HTTP_TIMEOUT)
            .build();
        Ok(Self {
            http: Arc::new(http),
            channel_ids: parse_channel_ids(channel_ids)?,
            admin_channel_ids: parse_channel_ids(admin_channel_ids)?,
        })
    }

    /// Posts plain text to every audience channel.
    pub async fn send_message(&self, content: &str) -> Result<(), ChatError> {
        self.broadcast(&self.channel_ids, Payload::Text(content))
            .await
    }

    /// Posts plain text to every admin channel.
    pub async fn send_admin_message(&self, content: &str) -> Result<(), ChatError> {
        self.broadcast(&self.admin_channel_ids, Payload::Text(content))
            .await
    }

    /// Posts an embed to every audience channel.
    pub async fn send_embed(&self, embed: Embed) -> Result<(), ChatError> {
        self.broadcast(&self.channel_ids, Payload::Embed(&embed))
            .await
    }

    /// Attempts delivery to every channel; the last failure is returned.
    async fn broadcast(
        &self,
        channels: &[Id<ChannelMarker>],
        payload: Payload<'_>,
    ) -> Result<(), ChatError> {
        let mut outcome = Ok(());
        for channel_id in channels {
            let request = self.http.create_message(*channel_id);
            let result = match payload {
                Payload::Text(content) => request.content(content).await,
                Payload::Embed(embed) => request.embeds(std::slice::from_ref(embed)).await,
            };
            match result {
                Ok(_) => debug!(stage = "chat", %channel_id, "message delivered"),
                Err(err) => {
                    error!(stage = "chat", %channel_id, error = %err, "failed to deliver message");
                    outcome = Err(ChatError::Send(err.to_string()));
                }
            }
        }
        outcome
    }
}

#[derive(Clone, Copy)]
enum Payload<'a> {
    Text(&'a str),
    Embed(&'a Embed),
}

/// Builds the rich "live now" announcement.
pub fn live_embed(headline: &str, game_name: &str, stream_title: &str, url: &str) -> Embed {
    let mut builder = EmbedBuilder::new()
        .title(headline)
        .url(url)
        .color(EMBED_COLOR);
    if !stream_title.is_empty() {
        builder = builder.field(EmbedFieldBuilder::new("Title", stream_title));
    }
    if !game_name.is_empty() {
        builder = builder.field(EmbedFieldBuilder::new("Game", game_name).inline());
    }
    builder.build()
}

fn parse_channel_ids(raw: &[String]) -> Result<Vec<Id<ChannelMarker>>, ChatError> {
    raw.iter()
        .map(|value| {
            value
                .parse::<u64>()
                .ok()
                .and_then(Id::new_checked)
                .ok_or_else(|| ChatError::InvalidChannelId(value.clone()))
        })
        .collect()
}

/// Errors raised by the chat collaborator.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid channel id: {0}")]
    InvalidChannelId(String),
    #[error("failed to send message: {0}")]
    Send(String),
    #[error("gateway session closed")]
    SessionClosed,
}
