use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use destek_db::Database;
use destek_types::auth::{Claims, verify_token};
use destek_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may wait before sending Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a gateway connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

/// Handle a WebSocket whose token was already verified at the HTTP upgrade
/// (`/ws?token=...`). Skips the Identify handshake.
pub async fn handle_connection_authenticated(socket: WebSocket, ctx: GatewayContext, claims: Claims) {
    let (sender, receiver) = socket.split();
    info!("{} ({}) connected to gateway (pre-authenticated)", claims.email, claims.sub);
    run_connection(sender, receiver, ctx, claims).await;
}

/// Handle a WebSocket that must authenticate with an Identify command first.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &ctx.jwt_secret, IDENTIFY_TIMEOUT).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", claims.email, claims.sub);
    run_connection(sender, receiver, ctx, claims).await;
}

async fn run_connection(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    claims: Claims,
) {
    let user_id = claims.sub;
    let ready = GatewayEvent::Ready { user_id, role: claims.role };
    let Some(frame) = encode(&ready) else {
        return;
    };
    if sender.send(frame).await.is_err() {
        return;
    }

    let (conn_id, mut user_rx) = ctx.dispatcher.register(user_id, claims.role).await;
    let mut broadcast_rx = ctx.dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event = tokio::select! {
                result = broadcast_rx.recv() => match result {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver lagged by {} messages", n);
                        continue;
                    }
                    Err(_) => break,
                },
                result = user_rx.recv() => match result {
                    Some(event) => event,
                    // Replaced by a newer connection
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(frame) = encode(&event) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.unregister(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", claims.email, user_id);
}

/// The first data frame must be a valid Identify. Control frames are skipped.
async fn wait_for_identify<S, E>(receiver: &mut S, jwt_secret: &str, within: Duration) -> Option<Claims>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Text(text) => {
                    return match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(GatewayCommand::Identify { token }) => verify_token(jwt_secret, &token),
                        _ => None,
                    };
                }
                _ => return None,
            }
        }
        None
    };

    tokio::time::timeout(within, identify).await.ok().flatten()
}

async fn handle_command(ctx: &GatewayContext, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::StartTyping { chat_room_id } => {
            let db = ctx.db.clone();
            let room = match tokio::task::spawn_blocking(move || db.get_chat_room(chat_room_id)).await {
                Ok(Ok(room)) => room,
                Ok(Err(e)) => {
                    error!("DB get_chat_room error: {}", e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            let Some(counterpart) = room.and_then(|r| r.counterpart_of(user_id)) else {
                warn!("{} typed in chat room {} they are not part of", user_id, chat_room_id);
                return;
            };

            ctx.dispatcher
                .send_to_user(counterpart, GatewayEvent::TypingStart { chat_room_id, user_id })
                .await;
        }
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}
