//! WebSocket sessions.
//!
//! Clients send plain-text commands. A topic name (`system`, `energy`,
//! `ports`, `training`, `all`) gets one `{"type":<topic>,"data":...}`
//! reply. `interval:<secs>` starts a periodic `{"type":"periodic",...}`
//! stream that runs until `stop`, any other command, or the socket closes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

use hostwatch_core::Monitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    System,
    Energy,
    Ports,
    Training,
    All,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Energy => "energy",
            Self::Ports => "ports",
            Self::Training => "training",
            Self::All => "all",
        }
    }

    fn collect(self, monitor: &Monitor) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::System => serde_json::to_value(monitor.system()),
            Self::Energy => serde_json::to_value(monitor.energy()),
            Self::Ports => serde_json::to_value(monitor.ports()),
            Self::Training => serde_json::to_value(monitor.training()),
            Self::All => serde_json::to_value(monitor.all()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsCommand {
    Snapshot(Topic),
    Interval(Duration),
    Stop,
}

/// Parse one client message. The error is the text sent back to the client.
pub fn parse_command(text: &str) -> Result<WsCommand, String> {
    let text = text.trim();
    let topic = match text {
        "system" => Topic::System,
        "energy" => Topic::Energy,
        "ports" => Topic::Ports,
        "training" => Topic::Training,
        "all" => Topic::All,
        "stop" => return Ok(WsCommand::Stop),
        _ => {
            if let Some(secs) = text.strip_prefix("interval:") {
                return match secs.trim().parse::<u64>() {
                    Ok(n) if n >= 1 => Ok(WsCommand::Interval(Duration::from_secs(n))),
                    _ => Err("invalid interval format, expected interval:<seconds> (>= 1)".into()),
                };
            }
            return Err(format!("unknown command '{text}'"));
        }
    };
    Ok(WsCommand::Snapshot(topic))
}

#[derive(Serialize)]
struct DataMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
}

/// Session ended; the client is gone.
struct Closed;

async fn send_json<T: Serialize>(socket: &mut WebSocket, payload: &T) -> Result<(), Closed> {
    let text = match serde_json::to_string(payload) {
        Ok(text) => text,
        Err(e) => {
            log::error!("cannot encode websocket payload: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await.map_err(|_| Closed)
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), Closed> {
    send_json(
        socket,
        &ErrorMessage {
            kind: "error",
            message,
        },
    )
    .await
}

/// Collect `topic` on the blocking pool and send it under `kind`. The
/// payload is fully built before anything is written.
async fn send_topic(
    socket: &mut WebSocket,
    monitor: &Arc<Monitor>,
    topic: Topic,
    kind: &str,
) -> Result<(), Closed> {
    let monitor = monitor.clone();
    match tokio::task::spawn_blocking(move || topic.collect(&monitor)).await {
        Ok(Ok(data)) => send_json(socket, &DataMessage { kind, data }).await,
        Ok(Err(e)) => send_error(socket, &format!("cannot encode {kind}: {e}")).await,
        Err(e) => {
            log::error!("websocket collection task failed: {e}");
            send_error(socket, "collection failed").await
        }
    }
}

/// Resolves on the next tick, or never when no stream is running.
async fn tick(periodic: &mut Option<Interval>) {
    match periodic {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub(crate) async fn session(mut socket: WebSocket, monitor: Arc<Monitor>) {
    let id = Uuid::new_v4();
    log::info!("websocket session {id} opened");
    let mut periodic: Option<Interval> = None;

    loop {
        let sent = tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log::debug!("websocket session {id} receive error: {e}");
                        break;
                    }
                };
                // Any command cancels a running stream.
                periodic = None;
                match parse_command(text.as_str()) {
                    Ok(WsCommand::Snapshot(topic)) => {
                        send_topic(&mut socket, &monitor, topic, topic.as_str()).await
                    }
                    Ok(WsCommand::Interval(every)) => {
                        log::debug!("websocket session {id} streaming every {every:?}");
                        let mut interval = tokio::time::interval(every);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        periodic = Some(interval);
                        Ok(())
                    }
                    Ok(WsCommand::Stop) => Ok(()),
                    Err(message) => send_error(&mut socket, &message).await,
                }
            }
            _ = tick(&mut periodic) => {
                send_topic(&mut socket, &monitor, Topic::All, "periodic").await
            }
        };
        if sent.is_err() {
            break;
        }
    }

    log::info!("websocket session {id} closed");
}
