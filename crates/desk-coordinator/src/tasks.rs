//! Supervised background tasks with cooperative shutdown.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A set of named background tasks sharing one cancellation token.
pub struct SupervisedTasks {
    cancel: CancellationToken,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for SupervisedTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisedTasks {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Token the tasks should select on to observe shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a named task tracked for shutdown.
    pub fn spawn<F>(&self, name: &str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            fut.await;
            debug!(task = %task_name, "background task finished");
        });
        self.handles.lock().push((name.to_string(), handle));
    }

    /// Cancel all tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<(String, JoinHandle<()>)> = std::mem::take(&mut *self.handles.lock());
        for (name, handle) in handles {
            if let Err(err) = handle.await {
                warn!(task = %name, error = %err, "background task join failed");
            }
        }
    }
}
