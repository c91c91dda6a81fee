//! Push hub: registry of live hub connections and their wire protocol.

pub mod events;
pub mod protocol;

use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub use events::HubEvent;
pub use protocol::Invocation;

struct HubClient {
    user_id: String,
    tx: mpsc::Sender<HubEvent>,
}

/// Tracks connected hub clients for server-initiated pushes.
#[derive(Default)]
pub struct HubBroadcaster {
    clients: RwLock<HashMap<Uuid, HubClient>>,
}

impl HubBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: &str, tx: mpsc::Sender<HubEvent>) -> Uuid {
        let id = Uuid::new_v4();
        let mut clients = self.clients.write().await;
        clients.insert(
            id,
            HubClient {
                user_id: user_id.to_string(),
                tx,
            },
        );
        log::debug!(
            "[{}] Hub client {} registered ({} connected)",
            user_id,
            id,
            clients.len()
        );
        id
    }

    pub async fn unregister(&self, id: Uuid) {
        if let Some(client) = self.clients.write().await.remove(&id) {
            log::debug!("[{}] Hub client {} unregistered", client.user_id, id);
        }
    }

    /// Push `event` to every connected client; returns how many accepted it.
    ///
    /// Clients whose connection is gone are dropped from the registry.
    pub async fn broadcast(&self, event: HubEvent) -> usize {
        let mut clients = self.clients.write().await;
        let mut delivered = 0;

        clients.retain(|id, client| match client.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "[{}] Hub client {} is backed up, dropping {} event",
                    client.user_id,
                    id,
                    event.name()
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        log::debug!(
            "Broadcast {} event to {} of {} hub clients",
            event.name(),
            delivered,
            clients.len()
        );
        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
