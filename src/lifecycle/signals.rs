//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a [`ShutdownReason::Signal`] post
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handler registration errors are returned, not panicked on
//! - SIGKILL cannot be caught and is not handled

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{OsSignal, ShutdownReason, ShutdownTrigger};

/// Spawn a task that posts the first SIGINT/SIGTERM to `trigger`.
///
/// Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn forward_os_signals(trigger: ShutdownTrigger) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = interrupt.recv() => OsSignal::Interrupt,
            _ = terminate.recv() => OsSignal::Terminate,
        };
        tracing::info!(signal = %received, "Termination signal received");
        trigger.post(ShutdownReason::Signal(received));
    }))
}

/// Spawn a task that posts the first Ctrl+C to `trigger`.
#[cfg(not(unix))]
pub fn forward_os_signals(trigger: ShutdownTrigger) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!(signal = %OsSignal::Interrupt, "Termination signal received");
                trigger.post(ShutdownReason::Signal(OsSignal::Interrupt));
            }
            Err(error) => tracing::error!(%error, "Failed listening for Ctrl+C"),
        }
    }))
}
