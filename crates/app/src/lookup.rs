use async_trait::async_trait;
use jaggerbot_core::ChannelInformation;
use jaggerbot_twitch::{AppTokenSource, HelixClient, HelixError, OAuthError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::control::ChannelLookup;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to obtain app access token: {0}")]
    Auth(#[from] OAuthError),
    #[error("channel information request failed: {0}")]
    Helix(#[from] HelixError),
}

/// Channel information from Helix with an app access token.
#[derive(Clone)]
pub struct TwitchChannelLookup {
    tokens: AppTokenSource,
    helix: HelixClient,
}

impl TwitchChannelLookup {
    pub fn new(tokens: AppTokenSource, helix: HelixClient) -> Self {
        Self { tokens, helix }
    }

    async fn fetch(&self, broadcaster_id: &str) -> Result<Vec<ChannelInformation>, LookupError> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .helix
            .get_channel_information(&token, broadcaster_id)
            .await?)
    }
}

#[async_trait]
impl ChannelLookup for TwitchChannelLookup {
    async fn channel_information(
        &self,
        broadcaster_id: &str,
    ) -> Result<Vec<ChannelInformation>, LookupError> {
        match self.fetch(broadcaster_id).await {
            Err(LookupError::Helix(err)) if err.is_unauthorized() => {
                // App tokens can be revoked before they expire.
                warn!(stage = "control", error = %err, "app token rejected, refreshing");
                self.tokens.invalidate().await;
                self.fetch(broadcaster_id).await
            }
            result => {
                if let Ok(channels) = &result {
                    debug!(stage = "control", broadcaster_id, results = channels.len(), "fetched channel information");
                }
                result
            }
        }
    }
}
