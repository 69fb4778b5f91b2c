//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to the RPC or HTTP layer
//!
//! Server task states:
//!     Bound → Serving → Draining → Stopped
//!                    ↘ Failed (posts ListenerFailure to the shutdown trigger)
//! ```
//!
//! # Design Decisions
//! - Binding happens before `start` returns, so a taken port is a startup
//!   error rather than a runtime failure
//! - Each listener serves on its own task and is stopped through a
//!   [`ServerHandle`] with a bounded drain
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{ShutdownReason, ShutdownTrigger};
pub use listener::ListenerError;

/// Extra time a server task gets after its own drain deadline.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Which of the two public listeners an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Rpc,
    Http,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Rpc => write!(f, "RPC"),
            ListenerKind::Http => write!(f, "HTTP"),
        }
    }
}

/// A running listener.
///
/// Dropping the handle leaves the server running; only [`ServerHandle::stop`]
/// shuts it down.
pub struct ServerHandle {
    kind: ListenerKind,
    local_addr: SocketAddr,
    initiate_stop: Box<dyn FnOnce(Duration) + Send>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn new(
        kind: ListenerKind,
        local_addr: SocketAddr,
        initiate_stop: impl FnOnce(Duration) + Send + 'static,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            kind,
            local_addr,
            initiate_stop: Box::new(initiate_stop),
            task,
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// The bound address, with the real port when configured with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight work finish within `timeout`, then
    /// force-close whatever is left.
    pub async fn stop(self, timeout: Duration) -> Result<(), ListenerError> {
        let Self {
            kind,
            initiate_stop,
            mut task,
            ..
        } = self;

        tracing::info!(listener = %kind, timeout_secs = timeout.as_secs(), "Stopping server");
        initiate_stop(timeout);

        match tokio::time::timeout(timeout + STOP_GRACE, &mut task).await {
            Ok(Ok(())) => {
                tracing::info!(listener = %kind, "Server stopped");
                Ok(())
            }
            Ok(Err(join_error)) => Err(ListenerError::Task {
                kind,
                message: join_error.to_string(),
            }),
            Err(_) => {
                task.abort();
                Err(ListenerError::ShutdownTimeout {
                    kind,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("kind", &self.kind)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// Drive a serving loop to completion and turn an unexpected exit into a
/// shutdown request.
pub(crate) async fn report_exit<F, E>(kind: ListenerKind, serve: F, trigger: ShutdownTrigger)
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    match serve.await {
        Ok(()) => tracing::info!(listener = %kind, "Server closed"),
        Err(error) => {
            tracing::error!(listener = %kind, error = %error, "Server failed");
            trigger.post(ShutdownReason::ListenerFailure {
                source: kind,
                error: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_server_posts_listener_failure() {
        let (trigger, listener) = ShutdownTrigger::new();

        report_exit(
            ListenerKind::Rpc,
            async { Err::<(), _>("accept loop died") },
            trigger,
        )
        .await;

        assert_eq!(
            listener.wait().await,
            ShutdownReason::ListenerFailure {
                source: ListenerKind::Rpc,
                error: "accept loop died".into(),
            }
        );
    }

    #[tokio::test]
    async fn clean_exit_posts_nothing() {
        let (trigger, _listener) = ShutdownTrigger::new();
        report_exit(ListenerKind::Http, async { Ok::<(), String>(()) }, trigger.clone()).await;
        assert!(!trigger.is_triggered());
    }

    #[tokio::test]
    async fn stuck_server_is_aborted_after_timeout() {
        let task = tokio::spawn(std::future::pending::<()>());
        let handle = ServerHandle::new(
            ListenerKind::Http,
            "127.0.0.1:0".parse().unwrap(),
            |_| {},
            task,
        );

        let err = handle.stop(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(
            err,
            ListenerError::ShutdownTimeout { kind: ListenerKind::Http, .. }
        ));
    }
}
