//! Registry of live WebSocket peers and the fan-out task that drains
//! published events to all of them (§4.E).
//!
//! The original implementation keys its peer set by weak reference so that
//! a closed socket disappears from the set without explicit bookkeeping.
//! Rust has no weak references to a plain value here, so registration is
//! explicit: a peer is added when its handler subscribes and removed when
//! that handler's task ends, via `PeerHandle`'s `Drop` impl.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const QUEUE_CAPACITY: usize = 1024;

type Peers = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<PeerMessage>>>>;

#[derive(Debug, Clone)]
pub enum PeerMessage {
    Text(String),
    Ping,
}

/// Unregisters its peer on drop, covering both clean and exceptional close.
pub struct PeerHandle {
    id: u64,
    peers: Peers,
    pub rx: mpsc::UnboundedReceiver<PeerMessage>,
}

impl Drop for PeerHandle {
    fn drop(&mut self) {
        let id = self.id;
        let peers = self.peers.clone();
        tokio::spawn(async move {
            peers.lock().await.remove(&id);
        });
    }
}

#[derive(Clone)]
pub struct Broadcast {
    peers: Peers,
    next_id: Arc<AtomicU64>,
    queue: mpsc::Sender<String>,
}

impl Broadcast {
    /// Spawns the drainer and ping tasks and returns the handle used to
    /// register peers and publish events. Both tasks run until the
    /// returned `tokio::task::JoinHandle`s are aborted at shutdown.
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);

        let drain_peers = peers.clone();
        let drainer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let guard = drain_peers.lock().await;
                for (id, sender) in guard.iter() {
                    if sender.send(PeerMessage::Text(event.clone())).is_err() {
                        tracing::debug!(peer = id, "dropping send to a peer that is closing");
                    }
                }
            }
        });

        let ping_peers = peers.clone();
        let ping = tokio::spawn(async move {
            let mut ticker = interval(PING_INTERVAL);
            loop {
                ticker.tick().await;
                let guard = ping_peers.lock().await;
                for (id, sender) in guard.iter() {
                    if sender.send(PeerMessage::Ping).is_err() {
                        tracing::debug!(peer = id, "ping to a peer that is closing");
                    }
                }
            }
        });

        (
            Self {
                peers,
                next_id: Arc::new(AtomicU64::new(0)),
                queue: tx,
            },
            drainer,
            ping,
        )
    }

    pub async fn register(&self) -> PeerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().await.insert(id, tx);
        PeerHandle {
            id,
            peers: self.peers.clone(),
            rx,
        }
    }

    /// Serializes `event` and any arguments into the comma-joined wire
    /// string and pushes it onto the bounded queue. Never blocks the
    /// caller for long: callers treat a full queue as best-effort and log
    /// rather than propagate (see `Ingest::run`).
    pub async fn publish(&self, event: &str, args: &[&str]) {
        let mut wire = event.to_string();
        for arg in args {
            wire.push(',');
            wire.push_str(arg);
        }
        if self.queue.try_send(wire).is_err() {
            tracing::warn!(event, "broadcast queue full, dropping event");
        }
    }
}
