use async_trait::async_trait;
use jaggerbot_discord::{live_embed, ChatError, DiscordClient};

use crate::control::{ChatSink, LiveAnnouncement};

#[async_trait]
impl ChatSink for DiscordClient {
    async fn send_message(&self, content: &str) -> Result<(), ChatError> {
        DiscordClient::send_message(self, content).await
    }

    async fn send_announcement(&self, announcement: &LiveAnnouncement) -> Result<(), ChatError> {
        let embed = live_embed(
            &announcement.headline,
            &announcement.game_name,
            &announcement.stream_title,
            &announcement.url,
        );
        self.send_embed(embed).await
    }

    async fn send_admin_message(&self, content: &str) -> Result<(), ChatError> {
        DiscordClient::send_admin_message(self, content).await
    }
}
