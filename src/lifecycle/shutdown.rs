//! Shutdown coordination for the gateway.
//!
//! A [`ShutdownTrigger`] is a single slot shared by every producer: the OS
//! signal forwarder and the serving loop of each listener. The first post
//! wins and wakes the one [`ShutdownListener`]; later posts are no-ops, so a
//! listener failing while teardown is already underway never starts a second
//! shutdown.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::net::ListenerKind;

/// Termination signals the process reacts to. SIGKILL cannot be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for OsSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsSignal::Interrupt => write!(f, "SIGINT"),
            OsSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// External termination request.
    Signal(OsSignal),
    /// A listener's serving loop died after startup.
    ListenerFailure { source: ListenerKind, error: String },
    /// Programmatic request (embedding code, tests).
    Requested,
    /// Every trigger handle was dropped without posting.
    Abandoned,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "received {signal}"),
            ShutdownReason::ListenerFailure { source, error } => {
                write!(f, "{source} listener failed: {error}")
            }
            ShutdownReason::Requested => write!(f, "shutdown requested"),
            ShutdownReason::Abandoned => write!(f, "all shutdown producers went away"),
        }
    }
}

/// Producer side of the shutdown slot. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownTrigger {
    slot: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

/// Consumer side of the shutdown slot. There is exactly one.
pub struct ShutdownListener {
    rx: oneshot::Receiver<ShutdownReason>,
}

impl ShutdownTrigger {
    /// Create a trigger and its single listener.
    pub fn new() -> (Self, ShutdownListener) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            ShutdownListener { rx },
        )
    }

    /// Post a shutdown request. Never blocks.
    ///
    /// Returns `true` only for the post that actually fired the trigger.
    pub fn post(&self, reason: ShutdownReason) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(tx) => tx.send(reason).is_ok(),
            None => {
                tracing::debug!(reason = %reason, "Shutdown already triggered, ignoring");
                false
            }
        }
    }

    /// Whether some producer already fired the trigger.
    pub fn is_triggered(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl ShutdownListener {
    /// Block until the first post arrives.
    pub async fn wait(self) -> ShutdownReason {
        self.rx.await.unwrap_or(ShutdownReason::Abandoned)
    }
}
