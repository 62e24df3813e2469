use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner of background work with a defined teardown.
///
/// Tasks spawned through the scope are aborted on [`TaskScope::shutdown`] or
/// when the scope is dropped. [`TaskScope::run`] yields `None` instead of a
/// result once the scope is closed, so callers never apply an update to
/// state that has been torn down.
pub struct TaskScope {
    closed: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScope {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Spawns `future` on the runtime, tied to this scope's lifetime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            tracing::debug!("scope closed, not spawning task");
            return;
        }
        let mut closed = self.closed.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = future => {}
                _ = closed.wait_for(|c| *c) => {}
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Runs `future` to completion unless the scope closes first.
    pub async fn run<F, T>(&self, future: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }
        tokio::select! {
            value = future => Some(value),
            _ = closed.wait_for(|c| *c) => None,
        }
    }

    /// Closes the scope: pending `run` calls resolve to `None` and spawned
    /// tasks are aborted.
    pub fn shutdown(&self) {
        self.closed.send_replace(true);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.shutdown();
    }
}
