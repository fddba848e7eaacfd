//! Acknowledgement and query handle.

use tokio::sync::{mpsc, oneshot};

use shared::{Notification, Order};

use crate::error::{PipelineError, PipelineResult};
use crate::session::SessionCommand;

/// Cheap clonable handle into a running session's reducer.
///
/// Every method is safe to call during shutdown: a closed session
/// surfaces as [`PipelineError::Worker`], never a panic.
#[derive(Clone)]
pub struct AckHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl AckHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { command_tx }
    }

    /// Flag every notification read, stop the chime, and push the read
    /// flags to the backend. Returns how many notifications flipped.
    ///
    /// Local state is authoritative: even if the remote write fails the
    /// notifications stay read here and the chime stays stopped.
    pub async fn mark_all_read(&self) -> PipelineResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::MarkAllRead { reply }).await?;
        rx.await.map_err(|_| closed())
    }

    /// Flip the sound preference. Returns the new enabled state.
    pub async fn toggle_sound(&self) -> PipelineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ToggleSound { reply }).await?;
        rx.await.map_err(|_| closed())
    }

    /// Stop the current chime without marking anything read. The next
    /// genuinely new notification rings again.
    pub async fn silence(&self) -> PipelineResult<()> {
        self.send(SessionCommand::Silence).await
    }

    /// Attach authenticated credentials to the running session and
    /// refetch immediately so pre-login orders appear.
    pub async fn authenticate(&self, user_id: impl Into<String>) -> PipelineResult<()> {
        self.send(SessionCommand::Authenticate {
            user_id: user_id.into(),
        })
        .await
    }

    /// Current unread notifications, most recent first.
    pub async fn unread_notifications(&self) -> PipelineResult<Vec<Notification>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Unread { reply }).await?;
        rx.await.map_err(|_| closed())
    }

    /// Currently tracked orders, most recent first.
    pub async fn orders(&self) -> PipelineResult<Vec<Order>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Orders { reply }).await?;
        rx.await.map_err(|_| closed())
    }

    async fn send(&self, command: SessionCommand) -> PipelineResult<()> {
        self.command_tx.send(command).await.map_err(|_| {
            tracing::debug!("Session reducer gone, command dropped");
            closed()
        })
    }
}

fn closed() -> PipelineError {
    PipelineError::Worker("session closed".into())
}
