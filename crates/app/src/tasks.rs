use std::net::SocketAddr;

use axum::Router;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::control::TaskExit;

pub const CALLBACK_SERVER_TASK: &str = "callback server";
pub const CHAT_SESSION_TASK: &str = "chat session";

/// Serves the router on `addr`, reporting bind or serve failures on `exits`.
pub fn spawn_callback_server(
    addr: SocketAddr,
    router: Router,
    exits: mpsc::Sender<TaskExit>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = serve(addr, router).await;
        report(&exits, TaskExit::new(CALLBACK_SERVER_TASK, result)).await;
    })
}

async fn serve(addr: SocketAddr, router: Router) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(stage = "app", addr = %listener.local_addr()?, "callback server listening");
    axum::serve(listener, router).await
}

/// Keeps the Discord gateway session open, reporting when it ends.
pub fn spawn_chat_session(bot_token: String, exits: mpsc::Sender<TaskExit>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = jaggerbot_discord::run_session(bot_token).await;
        report(&exits, TaskExit::new(CHAT_SESSION_TASK, result)).await;
    })
}

async fn report(exits: &mpsc::Sender<TaskExit>, exit: TaskExit) {
    let task = exit.task;
    if exits.send(exit).await.is_err() {
        warn!(stage = "app", task, "control loop gone, dropping task exit");
    }
}
