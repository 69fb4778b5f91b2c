//! Live connection registry for the RPC listener.
//!
//! Each accepted connection registers its peer under a fresh
//! [`ConnectionId`] and deregisters when its [`ConnectionGuard`] drops, so
//! the count stays right even when a handler task is aborted mid-request.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::observability::metrics;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, used as a tracing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc-{}", self.0)
    }
}

/// Shared view of the open connections. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    live: Arc<watch::Sender<u64>>,
    peers: Arc<DashMap<ConnectionId, SocketAddr>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            live: Arc::new(live),
            peers: Arc::new(DashMap::new()),
        }
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection from `peer` for as long as the guard lives.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId::next();
        self.peers.insert(id, peer);
        self.live.send_modify(|live| *live += 1);
        metrics::set_rpc_connections(self.active_count());

        ConnectionGuard {
            id,
            tracker: self.clone(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.live.borrow()
    }

    /// Peers of the currently open connections, in no particular order.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|entry| *entry.value()).collect()
    }

    /// Resolve once no connection is open.
    pub async fn wait_for_idle(&self) {
        let mut live = self.live.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = live.wait_for(|count| *count == 0).await;
    }

    fn release(&self, id: ConnectionId) {
        self.peers.remove(&id);
        self.live.send_modify(|live| *live = live.saturating_sub(1));
        metrics::set_rpc_connections(self.active_count());
    }
}

/// Registration of one open connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    tracker: ConnectionTracker,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release(self.id);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
