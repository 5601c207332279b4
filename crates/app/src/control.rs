use async_trait::async_trait;
use jaggerbot_core::{ChannelInformation, StreamEvent};
use jaggerbot_discord::ChatError;
use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dispatcher::HandoffReceiver;
use crate::lookup::LookupError;
use crate::webhook::CallbackError;

/// Outbound chat surface used by the control loop.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_message(&self, content: &str) -> Result<(), ChatError>;
    async fn send_announcement(&self, announcement: &LiveAnnouncement) -> Result<(), ChatError>;
    async fn send_admin_message(&self, content: &str) -> Result<(), ChatError>;
}

/// Channel information source used to enrich announcements.
#[async_trait]
pub trait ChannelLookup: Send + Sync {
    async fn channel_information(
        &self,
        broadcaster_id: &str,
    ) -> Result<Vec<ChannelInformation>, LookupError>;
}

/// Rich "live now" message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAnnouncement {
    pub headline: String,
    pub game_name: String,
    pub stream_title: String,
    pub url: String,
}

/// Fixed announcement text for the watched broadcaster.
#[derive(Debug, Clone)]
pub struct Announcer {
    broadcaster_id: String,
    headline: String,
    stream_url: String,
}

impl Announcer {
    pub fn new(
        broadcaster_id: impl Into<String>,
        broadcaster_login: &str,
        headline: Option<String>,
    ) -> Self {
        let headline = headline.unwrap_or_else(|| format!("{broadcaster_login} is live!"));
        Self {
            broadcaster_id: broadcaster_id.into(),
            headline,
            stream_url: format!("https://twitch.tv/{broadcaster_login}"),
        }
    }

    pub fn broadcaster_id(&self) -> &str {
        &self.broadcaster_id
    }

    pub fn plain_text(&self) -> String {
        format!("{} {}", self.headline, self.stream_url)
    }

    pub fn rich(&self, channel: &ChannelInformation) -> LiveAnnouncement {
        LiveAnnouncement {
            headline: self.headline.clone(),
            game_name: channel.game_name.clone(),
            stream_title: channel.title.clone(),
            url: self.stream_url.clone(),
        }
    }
}

/// Termination report from a long-running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExit {
    pub task: &'static str,
    pub result: Result<(), String>,
}

impl TaskExit {
    pub fn new<E: std::fmt::Display>(task: &'static str, result: Result<(), E>) -> Self {
        Self {
            task,
            result: result.map_err(|err| err.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("{task} failed: {reason}")]
    Fatal { task: &'static str, reason: String },
}

enum Input {
    Exit(Option<TaskExit>),
    Event(Option<StreamEvent>),
    Error(Option<CallbackError>),
}

/// Single consumer of stream events, callback diagnostics and task exits.
pub struct ControlLoop<C, L> {
    chat: C,
    lookup: L,
    announcer: Announcer,
    events: HandoffReceiver<StreamEvent>,
    errors: HandoffReceiver<CallbackError>,
    exits: mpsc::Receiver<TaskExit>,
}

impl<C, L> ControlLoop<C, L>
where
    C: ChatSink,
    L: ChannelLookup,
{
    pub fn new(
        chat: C,
        lookup: L,
        announcer: Announcer,
        events: HandoffReceiver<StreamEvent>,
        errors: HandoffReceiver<CallbackError>,
        exits: mpsc::Receiver<TaskExit>,
    ) -> Self {
        Self {
            chat,
            lookup,
            announcer,
            events,
            errors,
            exits,
        }
    }

    /// Runs until a task fails or every input has closed.
    pub async fn run(mut self) -> Result<(), ControlError> {
        let mut exits_open = true;
        let mut events_open = true;
        let mut errors_open = true;
        info!(stage = "control", "control loop listening");

        while exits_open || events_open || errors_open {
            let input = tokio::select! {
                exit = self.exits.recv(), if exits_open => Input::Exit(exit),
                event = self.events.recv(), if events_open => Input::Event(event),
                err = self.errors.recv(), if errors_open => Input::Error(err),
            };

            match input {
                Input::Exit(Some(exit)) => self.handle_exit(exit).await?,
                Input::Exit(None) => exits_open = false,
                Input::Event(Some(event)) => self.handle_event(event).await,
                Input::Event(None) => events_open = false,
                Input::Error(Some(err)) => self.handle_callback_error(err).await,
                Input::Error(None) => errors_open = false,
            }
        }

        info!(stage = "control", "all inputs closed, control loop stopping");
        Ok(())
    }

    async fn handle_exit(&self, exit: TaskExit) -> Result<(), ControlError> {
        match exit.result {
            Ok(()) => {
                info!(stage = "control", task = exit.task, "task exited cleanly");
                Ok(())
            }
            Err(reason) => {
                error!(stage = "control", task = exit.task, %reason, "task failed");
                self.admin(&format!("jagger ran into an error in {}: {reason}", exit.task))
                    .await;
                Err(ControlError::Fatal {
                    task: exit.task,
                    reason,
                })
            }
        }
    }

    async fn handle_event(&self, event: StreamEvent) {
        info!(
            stage = "control",
            broadcaster_id = %event.broadcaster_user_id,
            broadcaster_login = %event.channel_login(),
            "received stream event"
        );
        self.admin(&format!(
            "jagger received a stream.online event for {} ({})",
            event.broadcaster_user_name, event.broadcaster_user_id
        ))
        .await;

        let broadcaster_id = if event.broadcaster_user_id.is_empty() {
            self.announcer.broadcaster_id()
        } else {
            event.broadcaster_user_id.as_str()
        };

        match self.lookup.channel_information(broadcaster_id).await {
            Ok(channels) if channels.len() == 1 => {
                let announcement = self.announcer.rich(&channels[0]);
                match self.chat.send_announcement(&announcement).await {
                    Ok(()) => {
                        counter!("notifications_sent_total", "form" => "rich").increment(1);
                        info!(stage = "control", game = %announcement.game_name, "sent live announcement");
                    }
                    Err(err) => warn!(stage = "control", error = %err, "failed to send live announcement"),
                }
            }
            Ok(channels) => {
                warn!(stage = "control", results = channels.len(), "unexpected channel information response");
                self.admin(&format!(
                    "jagger got {} channel information results, expected one. Sending a plain message.",
                    channels.len()
                ))
                .await;
                self.send_plain().await;
            }
            Err(err) => {
                counter!("channel_lookup_failures_total").increment(1);
                warn!(stage = "control", error = %err, "channel information lookup failed");
                self.admin(&format!(
                    "jagger could not get channel information for the announcement. Sending a plain message. Error: {err}"
                ))
                .await;
                self.send_plain().await;
            }
        }
    }

    async fn handle_callback_error(&self, err: CallbackError) {
        warn!(stage = "control", error = %err, "callback rejected");
        self.admin(&format!("jagger webserver had an error handling a Twitch callback: {err}"))
            .await;
    }

    async fn send_plain(&self) {
        match self.chat.send_message(&self.announcer.plain_text()).await {
            Ok(()) => {
                counter!("notifications_sent_total", "form" => "plain").increment(1);
                info!(stage = "control", "sent plain live message");
            }
            Err(err) => warn!(stage = "control", error = %err, "failed to send plain live message"),
        }
    }

    async fn admin(&self, content: &str) {
        if let Err(err) = self.chat.send_admin_message(content).await {
            warn!(stage = "control", error = %err, "failed to relay admin message");
        }
    }
}
