use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RouterHandle;
use super::messages::InboundMessage;
use super::router::Router;
use super::types::OutboundMessage;
use crate::config::Config;

pub const DEFAULT_SIGNALING_PORT: u16 = 8082;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Heartbeat {
    ping_interval: Duration,
    pong_timeout: Duration,
}

pub struct SignalingServer {
    listener: TcpListener,
    handle: RouterHandle,
    heartbeat: Heartbeat,
}

impl SignalingServer {
    /// Bind the listener and start the router actor
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let handle = RouterHandle::spawn(Router::new(config.room_policy), config.mailbox_capacity);

        info!("Signaling server listening on {}", listener.local_addr()?);
        info!("Empty rooms: {:?}", config.room_policy);

        Ok(Self {
            listener,
            handle,
            heartbeat: Heartbeat {
                ping_interval: config.ping_interval,
                pong_timeout: config.pong_timeout,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Signaling server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let handle = self.handle.clone();
                    let heartbeat = self.heartbeat;

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, handle, heartbeat).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RouterHandle,
    heartbeat: Heartbeat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let client_id = handle.connect(tx).await?;
    info!("WebSocket connection from {} as {}", addr, client_id);

    let mut ping_interval = tokio::time::interval(heartbeat.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", client_id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + heartbeat.pong_timeout);
                debug!("Ping sent to {}", client_id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", client_id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", client_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match InboundMessage::parse(text.as_str()) {
                        Ok(message) => {
                            if let Err(e) = handle.dispatch(client_id, message).await {
                                error!("Dropping {}: {}", client_id, e);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Closing {}: {}", client_id, e);
                            let _ = ctrl_tx.send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Invalid,
                                reason: "malformed message".into(),
                            })));
                            break;
                        }
                    },
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", client_id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", client_id);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // The connection counts as closed only once the router has let go of it.
    let cleanup = handle.disconnect(client_id).await;

    drop(ctrl_tx);
    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    info!("WebSocket disconnected: {} ({})", client_id, addr);

    cleanup?;
    Ok(())
}
