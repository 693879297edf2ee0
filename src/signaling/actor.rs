use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::messages::InboundMessage;
use super::router::Router;
use super::types::{ClientId, OutboundMessage, SignalingError};

/// Commands sent to the router actor
pub(crate) enum RouterCommand {
    Connect {
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ClientId>,
    },
    Inbound {
        from: ClientId,
        message: InboundMessage,
    },
    Disconnect {
        id: ClientId,
        done: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
}

/// Counts at the moment the actor answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub clients: usize,
    pub rooms: usize,
}

/// Runs every command to completion before taking the next one.
pub(crate) async fn router_actor(mut rx: mpsc::Receiver<RouterCommand>, mut router: Router) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RouterCommand::Connect { tx, reply } => {
                let id = router.connect(tx);
                if reply.send(id).is_err() {
                    // connection went away while waiting
                    router.disconnect(id);
                }
            }

            RouterCommand::Inbound { from, message } => {
                router.dispatch(from, message);
            }

            RouterCommand::Disconnect { id, done } => {
                router.disconnect(id);
                let _ = done.send(());
            }

            RouterCommand::Stats { reply } => {
                let _ = reply.send(RouterStats {
                    clients: router.clients().len(),
                    rooms: router.rooms().len(),
                });
            }
        }
    }

    info!(
        "Router stopped with {} peers and {} rooms",
        router.clients().len(),
        router.rooms().len()
    );
}

/// Handle to communicate with the router actor
#[derive(Clone)]
pub struct RouterHandle {
    pub(crate) tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Spawn the actor that owns `router`. It stops once every handle is dropped.
    pub fn spawn(router: Router, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RouterCommand>(capacity);
        tokio::spawn(router_actor(rx, router));
        Self { tx }
    }

    /// Register a connection and get its id
    pub async fn connect(
        &self,
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ClientId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RouterCommand::Connect {
            tx: peer_tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| actor_gone())
    }

    /// Queue a parsed message; it is handled after everything queued before it
    pub async fn dispatch(
        &self,
        from: ClientId,
        message: InboundMessage,
    ) -> Result<(), SignalingError> {
        self.send(RouterCommand::Inbound { from, message }).await
    }

    /// Leave + deregister. Returns once the cleanup has run.
    pub async fn disconnect(&self, id: ClientId) -> Result<(), SignalingError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(RouterCommand::Disconnect { id, done: done_tx })
            .await?;
        done_rx.await.map_err(|_| actor_gone())
    }

    pub async fn stats(&self) -> Result<RouterStats, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RouterCommand::Stats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| actor_gone())
    }

    async fn send(&self, cmd: RouterCommand) -> Result<(), SignalingError> {
        self.tx.send(cmd).await.map_err(|_| actor_gone())
    }
}

fn actor_gone() -> SignalingError {
    SignalingError::Internal("actor channel closed".to_string())
}
