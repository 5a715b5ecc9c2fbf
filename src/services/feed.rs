//! Live feed hub: fan-out of claim events to connected websocket clients.
//!
//! Each connection registers an mpsc sender on join and removes it on part.
//! Broadcast is best-effort: a client whose channel is full misses the frame,
//! a client whose channel is closed is pruned.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use crate::frame::Frame;

/// Outbound queue depth per feed client.
pub const CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct FeedHub {
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>,
}

impl FeedHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, client_id: Uuid, tx: mpsc::Sender<Frame>) {
        self.clients.write().await.insert(client_id, tx);
    }

    pub async fn part(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
    }

    #[cfg(test)]
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Send `frame` to every client. Returns how many accepted it.
    pub async fn broadcast(&self, frame: &Frame) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let clients = self.clients.read().await;
            for (client_id, tx) in clients.iter() {
                match tx.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(%client_id, syscall = %frame.syscall, "feed: client queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*client_id),
                }
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write().await;
            for client_id in closed {
                clients.remove(&client_id);
            }
        }
        delivered
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
