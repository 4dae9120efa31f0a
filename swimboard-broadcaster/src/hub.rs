use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::error::{HubError, Result};

/// Queued snapshots per subscriber before it counts as stalled.
const SUBSCRIBER_QUEUE: usize = 16;

/// Fan-out point for scoreboard snapshots.
///
/// Every committed state change is published here as one complete JSON
/// document. Subscribers are either in-process channels (the transport
/// layer) or Unix-socket display clients; both receive the current snapshot
/// immediately on subscription, so a late joiner is consistent without any
/// catch-up log. Delivery is fire-and-forget: a subscriber that cannot keep
/// up is dropped, never waited for.
pub struct SnapshotHub {
    socket_path: PathBuf,
    subscribers: Mutex<Vec<mpsc::Sender<Arc<str>>>>,
    last: RwLock<Option<Arc<str>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    running: RwLock<bool>,
}

impl SnapshotHub {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            subscribers: Mutex::new(Vec::new()),
            last: RwLock::new(None),
            accept_task: Mutex::new(None),
            running: RwLock::new(false),
        }
    }

    /// Start accepting display clients on the snapshot socket.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if *self.running.read().await {
            return Err(HubError::AlreadyRunning);
        }

        // Remove a stale socket from a previous run.
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(path = %self.socket_path.display(), "snapshot hub listening");

        *self.running.write().await = true;

        let hub = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                if !*hub.running.read().await {
                    break;
                }
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        tracing::info!("display client connected");
                        let rx = hub.subscribe().await;
                        tokio::spawn(Client::new(stream).run(rx));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to accept display client");
                    }
                }
            }
            tracing::info!("snapshot accept task stopped");
        });

        *self.accept_task.lock().await = Some(task);
        Ok(())
    }

    /// Stop accepting clients and remove the socket.
    pub async fn stop(&self) -> Result<()> {
        if !*self.running.read().await {
            return Err(HubError::NotStarted);
        }
        *self.running.write().await = false;

        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        tracing::info!("snapshot hub stopped");
        Ok(())
    }

    /// Register an in-process subscriber.
    ///
    /// The current snapshot, if any, is queued immediately.
    pub async fn subscribe(&self) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        if let Some(last) = self.last.read().await.clone() {
            let _ = tx.try_send(last);
        }
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Publish one complete snapshot to every subscriber.
    ///
    /// The snapshot is serialized exactly once. Subscribers whose queues are
    /// full or closed are dropped on the spot.
    pub async fn publish<T: Serialize>(&self, snapshot: &T) -> Result<()> {
        let mut json = serde_json::to_string(snapshot)?;
        json.push('\n');
        let line: Arc<str> = Arc::from(json);

        *self.last.write().await = Some(Arc::clone(&line));

        let mut subscribers = self.subscribers.lock().await;
        let before = subscribers.len();
        subscribers.retain(|tx| match tx.try_send(Arc::clone(&line)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("dropping subscriber that cannot keep up");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        let dropped = before - subscribers.len();
        if dropped > 0 {
            tracing::info!(dropped, remaining = subscribers.len(), "pruned dead subscribers");
        }
        Ok(())
    }

    /// Number of live subscribers (in-process and socket clients).
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// The most recently published snapshot line.
    pub async fn last_snapshot(&self) -> Option<Arc<str>> {
        self.last.read().await.clone()
    }
}

impl Drop for SnapshotHub {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Probe {
        seq: u32,
    }

    #[tokio::test]
    async fn publish_reaches_subscriber_and_updates_last() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(SnapshotHub::new(dir.path().join("hub.sock")));

        let mut rx = hub.subscribe().await;
        hub.publish(&Probe { seq: 1 }).await.unwrap();

        let line = rx.recv().await.unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["seq"], 1);
        assert_eq!(hub.last_snapshot().await.unwrap(), line);
    }

    #[tokio::test]
    async fn late_subscriber_gets_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(SnapshotHub::new(dir.path().join("hub.sock")));

        hub.publish(&Probe { seq: 7 }).await.unwrap();
        let mut rx = hub.subscribe().await;

        let line = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["seq"], 7);
    }

    #[tokio::test]
    async fn stalled_subscriber_is_dropped_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(SnapshotHub::new(dir.path().join("hub.sock")));

        // Subscribe and never drain.
        let _rx = hub.subscribe().await;
        assert_eq!(hub.subscriber_count().await, 1);

        for seq in 0..(SUBSCRIBER_QUEUE as u32 + 2) {
            hub.publish(&Probe { seq }).await.unwrap();
        }
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Arc::new(SnapshotHub::new(dir.path().join("hub.sock")));

        let rx = hub.subscribe().await;
        drop(rx);
        hub.publish(&Probe { seq: 1 }).await.unwrap();
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
