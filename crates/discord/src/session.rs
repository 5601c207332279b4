use tracing::{info, trace, warn};
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};

use crate::client::ChatError;

/// Keeps the bot's gateway session open.
///
/// The shard reconnects on its own after recoverable failures; the stream only
/// ends once the session can no longer be resumed (for example after an
/// authentication failure), which is reported as [`ChatError::SessionClosed`].
pub async fn run_session(bot_token: String) -> Result<(), ChatError> {
    let mut shard = Shard::new(ShardId::ONE, bot_token, Intents::GUILDS);
    info!(stage = "chat", "discord gateway session starting");

    while let Some(item) = shard.next_event(EventTypeFlags::READY | EventTypeFlags::RESUMED).await {
        match item {
            Ok(Event::Ready(ready)) => {
                info!(
                    stage = "chat",
                    user = %ready.user.name,
                    guilds = ready.guilds.len(),
                    "discord session ready"
                );
            }
            Ok(Event::Resumed) => info!(stage = "chat", "discord session resumed"),
            Ok(event) => trace!(stage = "chat", kind = ?event.kind(), "unhandled gateway event"),
            Err(err) => warn!(stage = "chat", error = %err, "error receiving gateway event"),
        }
    }

    warn!(stage = "chat", "discord gateway session ended");
    Err(ChatError::SessionClosed)
}
