mod chat;
mod control;
mod dispatcher;
mod lookup;
mod router;
mod tasks;
mod telemetry;
mod webhook;

use std::{sync::Arc, time::Duration};

use jaggerbot_discord::DiscordClient;
use jaggerbot_twitch::{
    AppTokenSource, HelixClient, SubscriptionManager, SubscriptionPolicy, TwitchOAuthClient,
};
use jaggerbot_util::{load_env_file, AppConfig};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::control::{Announcer, ChannelLookup, ControlLoop};
use crate::lookup::TwitchChannelLookup;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(config.environment)?;
    let metrics = telemetry::init_metrics()?;
    info!(stage = "app", twitch = ?config.twitch, discord = ?config.discord, "configuration loaded");

    let (events, event_rx) = dispatcher::handoff();
    let (errors, error_rx) = dispatcher::handoff();
    let (exits, exit_rx) = mpsc::channel(2);

    let discord = DiscordClient::new(
        config.discord.bot_token.clone(),
        &config.discord.channel_ids,
        &config.discord.admin_channel_ids,
    )?;
    tasks::spawn_chat_session(config.discord.bot_token.clone(), exits.clone());
    admin(&discord, "started jagger discord client...").await;

    let secret: Arc<[u8]> = Arc::from(config.twitch.eventsub_secret.as_bytes());
    let state = router::AppState::new(metrics, secret, events, errors);
    info!(stage = "app", addr = %config.bind_addr, env = %config.environment.as_str(), "starting HTTP server");
    tasks::spawn_callback_server(config.bind_addr, router::app_router(state), exits);
    admin(&discord, "started jagger webserver...").await;

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let oauth = TwitchOAuthClient::new(
        config.twitch.client_id.clone(),
        config.twitch.client_secret.clone(),
        config.twitch.oauth_base_url.clone(),
        http.clone(),
    );
    let tokens = AppTokenSource::new(oauth);
    let helix = HelixClient::new(
        config.twitch.client_id.clone(),
        config.twitch.helix_base_url.clone(),
        http,
    );

    let policy = if config.twitch.flush_subscriptions {
        SubscriptionPolicy::Flush
    } else {
        SubscriptionPolicy::Reconcile
    };
    let subscriptions = SubscriptionManager::new(tokens.clone(), helix.clone(), policy);
    match subscriptions
        .ensure_subscription(
            &config.twitch.broadcaster_id,
            &config.twitch.eventsub_secret,
            config.twitch.callback_url.as_str(),
        )
        .await
    {
        Ok(outcome) => info!(stage = "subscription", ?outcome, "stream.online subscription ready"),
        Err(err) => {
            error!(stage = "subscription", error = %err, "failed to set up subscription");
            admin(&discord, &format!("jagger ran into an error setting up Twitch: {err}")).await;
            return Err(err.into());
        }
    }

    let lookup = TwitchChannelLookup::new(tokens, helix);
    match lookup
        .channel_information(&config.twitch.broadcaster_id)
        .await
    {
        Ok(channels) => info!(stage = "app", ?channels, "initial channel information"),
        Err(err) => warn!(stage = "app", error = %err, "could not get channel information"),
    }

    admin(&discord, "jagger is listening for Twitch events...").await;
    let announcer = Announcer::new(
        config.twitch.broadcaster_id.clone(),
        &config.twitch.broadcaster_login,
        config.discord.headline.clone(),
    );
    ControlLoop::new(discord, lookup, announcer, event_rx, error_rx, exit_rx)
        .run()
        .await
        .map_err(|err| err.into())
}

async fn admin(discord: &DiscordClient, content: &str) {
    if let Err(err) = discord.send_admin_message(content).await {
        warn!(stage = "app", error = %err, "failed to relay admin message");
    }
}
