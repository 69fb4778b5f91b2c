//! Rollback stack for acquired resources.
//!
//! Every acquisition step pushes exactly one rollback action once it has
//! succeeded. Running the chain pops actions in reverse order of
//! acquisition. A failing or panicking action is logged and the remaining
//! actions still run, so one stuck listener cannot keep the storage
//! connection or the buffer pool from being released.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// Error type returned by rollback actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct Entry {
    name: String,
    action: Action,
}

/// Ordered stack of rollback actions, consumed once by [`CleanupChain::run`].
#[derive(Default)]
pub struct CleanupChain {
    entries: Vec<Entry>,
}

/// Outcome of a chain run, in the order the actions ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl CleanupReport {
    /// Number of actions that were invoked, whatever their outcome.
    pub fn invoked(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

fn entry<F, Fut, E>(name: impl Into<String>, f: F) -> Entry
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    Entry {
        name: name.into(),
        action: Box::new(move || {
            async move {
                let result: Result<(), BoxError> = f().await.map_err(Into::into);
                result
            }
            .boxed()
        }),
    }
}

impl CleanupChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an async rollback action. It runs before everything pushed earlier.
    pub fn push<F, Fut, E>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.entries.push(entry(name, action));
    }

    /// Push a synchronous rollback action.
    pub fn push_sync<F, E>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.entries.push(entry(name, move || async move { action() }));
    }

    /// Register an action that runs after every other action, including ones pushed later.
    pub fn push_final<F, E>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.entries.insert(0, entry(name, move || async move { action() }));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Action names in the order they will run.
    pub fn pending(&self) -> Vec<&str> {
        self.entries.iter().rev().map(|e| e.name.as_str()).collect()
    }

    /// Run every action, last pushed first.
    pub async fn run(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        while let Some(Entry { name, action }) = self.entries.pop() {
            let outcome = AssertUnwindSafe(async move { action().await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    tracing::debug!(step = %name, "Rollback step completed");
                    report.completed.push(name);
                }
                Ok(Err(error)) => {
                    tracing::error!(step = %name, error = %error, "Rollback step failed");
                    report.failed.push(name);
                }
                Err(_) => {
                    tracing::error!(step = %name, "Rollback step panicked");
                    report.failed.push(name);
                }
            }
        }

        report
    }
}

impl Drop for CleanupChain {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                pending = ?self.pending(),
                "Cleanup chain dropped without running"
            );
        }
    }
}
