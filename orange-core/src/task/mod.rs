//! Named groups of spawned tasks sharing one cancellation token.
//!
//! A link owns one group for its reader, writer and heartbeat loops.
//! Cancelling the group's token asks every task to wind down;
//! [`TaskGroup::shutdown`] cancels and then awaits them all.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct TaskGroup {
    token: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Group whose token is `token`; cancelling it from outside stops
    /// the group's tasks too.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            tasks: Vec::new(),
        }
    }

    /// Spawn `f` with a clone of the group's token.
    ///
    /// The task is expected to watch the token itself so that it can
    /// finish cleanly (e.g. send a close frame) instead of being dropped
    /// mid-await.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|(_, handle)| !handle.is_finished());
        let handle = tokio::spawn(f(self.token.clone()));
        self.tasks.push((name, handle));
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of tasks that have not finished yet.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Cancel the token and wait for every task to return.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for (name, handle) in std::mem::take(&mut self.tasks) {
            match handle.await {
                Ok(()) => debug!(task = name, "task finished"),
                Err(e) if e.is_cancelled() => debug!(task = name, "task aborted"),
                Err(e) => warn!(task = name, "task panicked: {e}"),
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        // A group dropped without shutdown still stops its tasks.
        self.token.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────
