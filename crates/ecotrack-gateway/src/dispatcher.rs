use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

use ecotrack_types::events::{GatewayEvent, OnlineUser};

/// One live gateway connection as seen by the presence map.
struct PresenceEntry {
    conn_id: Uuid,
    name: String,
    connected_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    close: oneshot::Sender<()>,
}

/// Handles handed to a freshly registered connection.
pub struct Registration {
    pub conn_id: Uuid,
    /// Sender for replies addressed to this connection only.
    pub reply: mpsc::UnboundedSender<GatewayEvent>,
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
    /// Resolves when a newer connection for the same user takes over.
    pub closed: oneshot::Receiver<()>,
}

/// Tracks which users hold a live connection and fans events out to them.
/// Process-local: a second server instance has its own, disjoint view.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> current connection. A newer connection replaces an older one.
    presence: RwLock<HashMap<Uuid, PresenceEntry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user as online. The new connection receives the online list
    /// first, then every other connection receives the updated list.
    pub async fn connect(&self, user_id: Uuid, name: String) -> Registration {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let (close, closed) = oneshot::channel();
        let now = Utc::now();

        let users = {
            let mut presence = self.inner.presence.write().await;
            let replaced = presence.insert(
                user_id,
                PresenceEntry {
                    conn_id,
                    name,
                    connected_at: now,
                    last_seen: now,
                    tx: tx.clone(),
                    close,
                },
            );
            if let Some(old) = replaced {
                info!("Connection {} of {} replaced by {}", old.conn_id, user_id, conn_id);
                let _ = old.close.send(());
            }
            snapshot(&presence)
        };

        let _ = tx.send(GatewayEvent::PresenceOnline { users: users.clone() });
        self.broadcast_except(user_id, GatewayEvent::PresenceOnline { users }).await;

        Registration {
            conn_id,
            reply: tx,
            events: rx,
            closed,
        }
    }

    /// Remove a user, but only if `conn_id` still owns the entry, then
    /// broadcast the updated list. Returns whether anything was removed.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        {
            let mut presence = self.inner.presence.write().await;
            let owns = presence
                .get(&user_id)
                .is_some_and(|entry| entry.conn_id == conn_id);
            if !owns {
                // A newer connection has taken over; don't touch anything
                return false;
            }
            presence.remove(&user_id);
        }

        self.broadcast_presence().await;
        true
    }

    /// Refresh the last-seen timestamp of a connection.
    pub async fn touch(&self, user_id: Uuid, conn_id: Uuid) {
        let mut presence = self.inner.presence.write().await;
        if let Some(entry) = presence.get_mut(&user_id) {
            if entry.conn_id == conn_id {
                entry.last_seen = Utc::now();
            }
        }
    }

    /// Online users sorted by name, then id.
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        snapshot(&*self.inner.presence.read().await)
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.presence.read().await.contains_key(&user_id)
    }

    /// Send an event to a user's current connection. Returns false when the
    /// user is offline.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let presence = self.inner.presence.read().await;
        match presence.get(&user_id) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Send the current online list to every connection.
    pub async fn broadcast_presence(&self) {
        let presence = self.inner.presence.read().await;
        let users = snapshot(&presence);
        for entry in presence.values() {
            let _ = entry.tx.send(GatewayEvent::PresenceOnline { users: users.clone() });
        }
    }

    async fn broadcast_except(&self, skip: Uuid, event: GatewayEvent) {
        let presence = self.inner.presence.read().await;
        for (user_id, entry) in presence.iter() {
            if *user_id != skip {
                let _ = entry.tx.send(event.clone());
            }
        }
    }
}

fn snapshot(presence: &HashMap<Uuid, PresenceEntry>) -> Vec<OnlineUser> {
    let mut users: Vec<OnlineUser> = presence
        .iter()
        .map(|(user_id, entry)| OnlineUser {
            user_id: *user_id,
            name: entry.name.clone(),
            connected_at: entry.connected_at,
            last_seen: entry.last_seen,
        })
        .collect();
    users.sort_by(|a, b| a.name.cmp(&b.name).then(a.user_id.cmp(&b.user_id)));
    users
}
