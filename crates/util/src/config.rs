use std::{env, fmt, net::SocketAddr};

use url::Url;

use super::server_bind_address;

pub const DEFAULT_OAUTH_BASE_URL: &str = "https://id.twitch.tv/oauth2/";
pub const DEFAULT_HELIX_BASE_URL: &str = "https://api.twitch.tv/helix/";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Twitch application credentials and the broadcaster being watched.
#[derive(Clone)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub eventsub_secret: String,
    pub callback_url: Url,
    pub flush_subscriptions: bool,
    pub oauth_base_url: Url,
    pub helix_base_url: Url,
}

impl fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("broadcaster_id", &self.broadcaster_id)
            .field("broadcaster_login", &self.broadcaster_login)
            .field("eventsub_secret", &"<redacted>")
            .field("callback_url", &self.callback_url.as_str())
            .field("flush_subscriptions", &self.flush_subscriptions)
            .field("oauth_base_url", &self.oauth_base_url.as_str())
            .field("helix_base_url", &self.helix_base_url.as_str())
            .finish()
    }
}

/// Discord bot credentials and the channels it posts to.
#[derive(Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_ids: Vec<String>,
    pub admin_channel_ids: Vec<String>,
    pub headline: Option<String>,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"<redacted>")
            .field("channel_ids", &self.channel_ids)
            .field("admin_channel_ids", &self.admin_channel_ids)
            .field("headline", &self.headline)
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub twitch: TwitchConfig,
    pub discord: DiscordConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let twitch = TwitchConfig {
            client_id: required("TWITCH_CLIENT_ID")?,
            client_secret: required("TWITCH_CLIENT_SECRET")?,
            broadcaster_id: required("TWITCH_BROADCASTER_ID")?,
            broadcaster_login: required("TWITCH_BROADCASTER_LOGIN")?,
            eventsub_secret: required("TWITCH_EVENTSUB_SECRET")?,
            callback_url: url_var("TWITCH_CALLBACK_URL", None)?,
            flush_subscriptions: bool_var("TWITCH_SUBSCRIPTION_FLUSH")?,
            oauth_base_url: url_var("TWITCH_OAUTH_BASE_URL", Some(DEFAULT_OAUTH_BASE_URL))?,
            helix_base_url: url_var("TWITCH_HELIX_BASE_URL", Some(DEFAULT_HELIX_BASE_URL))?,
        };

        let discord = DiscordConfig {
            bot_token: required("DISCORD_BOT_TOKEN")?,
            channel_ids: list_var("DISCORD_CHANNEL_IDS"),
            admin_channel_ids: list_var("DISCORD_ADMIN_CHANNEL_IDS"),
            headline: optional("ANNOUNCE_HEADLINE"),
        };

        Ok(Self {
            bind_addr,
            environment,
            twitch,
            discord,
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingVar(name))
}

fn url_var(name: &'static str, default: Option<&str>) -> Result<Url, ConfigError> {
    let value = match (optional(name), default) {
        (Some(value), _) => value,
        (None, Some(default)) => default.to_string(),
        (None, None) => return Err(ConfigError::MissingVar(name)),
    };
    Url::parse(&value).map_err(|err| ConfigError::InvalidVar {
        name,
        detail: err.to_string(),
    })
}

fn bool_var(name: &'static str) -> Result<bool, ConfigError> {
    match optional(name).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidVar {
            name,
            detail: format!("expected a boolean (got {other})"),
        }),
    }
}

/// Splits a comma-separated list, dropping blank entries.
fn list_var(name: &'static str) -> Vec<String> {
    optional(name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidVar { name: &'static str, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "{name} must be set"),
            Self::InvalidVar { name, detail } => write!(f, "invalid {name} value: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {}
