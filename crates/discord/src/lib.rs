//! Discord side of the bot: message delivery over HTTP and the gateway
//! session that keeps the bot online.
pub mod client;
pub mod session;

pub use client::{live_embed, ChatError, DiscordClient};
pub use session::run_session;
