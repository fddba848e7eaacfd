//! Background task registry.
//!
//! Every long-running loop of the session (subscription, poll,
//! reducer, agent) registers here so shutdown is one call and a
//! panicking loop is logged instead of vanishing silently.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Long-lived worker loop (reducer, agent).
    Worker,
    /// Event stream listener (subscription).
    Listener,
    /// Timer-driven loop (safety-net poll).
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Listener => write!(f, "Listener"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Registry of the session's background loops.
pub struct SessionTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl SessionTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token the loops watch for shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register and start a loop. Panics inside the loop are caught
    /// and logged; they never take the process down.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrapped = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            if let Err(panic_info) = result {
                let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::error!(task = %name, kind = %kind, panic = %panic_msg, "Session task panicked");
            }
        };
        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "Registered session task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks that have already exited.
    pub fn finished_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.handle.is_finished()).count()
    }

    /// Cancel every loop and wait for each to finish.
    pub async fn shutdown(self) {
        tracing::debug!("Shutting down {} session tasks", self.tasks.len());
        self.shutdown.cancel();
        for task in self.tasks {
            match task.handle.await {
                Ok(()) => tracing::debug!(task = %task.name, "Task completed"),
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(task = %task.name, "Task cancelled")
                }
                Err(e) => tracing::error!(task = %task.name, error = ?e, "Task panicked"),
            }
        }
    }
}

impl Default for SessionTasks {
    fn default() -> Self {
        Self::new()
    }
}
