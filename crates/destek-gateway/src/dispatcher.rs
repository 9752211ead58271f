use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use destek_types::events::GatewayEvent;
use destek_types::models::Role;

/// Who an event is for.
#[derive(Debug, Clone)]
pub enum Audience {
    All,
    User(Uuid),
    Users(Vec<Uuid>),
    /// Every connected admin
    Admins,
    /// One user plus every admin, each connection at most once
    UserAndAdmins(Uuid),
}

struct ClientHandle {
    conn_id: Uuid,
    role: Role,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Process-wide map of connected clients. Events for users that are not
/// connected are dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events; every connection receives these
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> newest connection
    clients: RwLock<HashMap<Uuid, ClientHandle>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                clients: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events sent to everyone.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub async fn publish(&self, audience: Audience, event: GatewayEvent) {
        match audience {
            Audience::All => self.broadcast(event),
            Audience::User(user_id) => self.send_to_user(user_id, event).await,
            Audience::Users(user_ids) => {
                let clients = self.inner.clients.read().await;
                for user_id in user_ids {
                    if let Some(client) = clients.get(&user_id) {
                        let _ = client.tx.send(event.clone());
                    }
                }
            }
            Audience::Admins => {
                let clients = self.inner.clients.read().await;
                for client in clients.values().filter(|c| c.role.is_admin()) {
                    let _ = client.tx.send(event.clone());
                }
            }
            Audience::UserAndAdmins(user_id) => {
                let clients = self.inner.clients.read().await;
                for (id, client) in clients.iter() {
                    if *id == user_id || client.role.is_admin() {
                        let _ = client.tx.send(event.clone());
                    }
                }
            }
        }
    }

    /// Register a connection for `user_id`, replacing any older one.
    /// Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid, role: Role) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .inner
            .clients
            .write()
            .await
            .insert(user_id, ClientHandle { conn_id, role, tx });
        if let Some(previous) = previous {
            debug!("user {} replaced connection {}", user_id, previous.conn_id);
        }
        (conn_id, rx)
    }

    /// Unregister a connection, but only if conn_id still matches.
    /// Returns whether an entry was removed.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut clients = self.inner.clients.write().await;
        match clients.get(&user_id) {
            Some(client) if client.conn_id == conn_id => {
                clients.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Send a targeted event to a specific user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let clients = self.inner.clients.read().await;
        if let Some(client) = clients.get(&user_id) {
            let _ = client.tx.send(event);
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.clients.read().await.len()
    }
}
