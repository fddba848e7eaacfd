//! Background agent lifecycle.
//!
//! The agent runs `install → activate → running` independently of any
//! foreground session. While running it reacts to bridge messages and,
//! on its own periodic tick, asks a foreground context (when one
//! exists) to re-check notifications. It holds no data service
//! credentials, so it never queries the backend itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use shared::agent::{AgentCommand, AgentMessage, PlatformAlertPayload};

use crate::alerts::AlertSink;
use crate::bridge::{AgentBridge, BridgeEndpoint};
use crate::cache::ShellCache;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Installed,
    Activated,
    Running,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Period of the foreground re-check nudge.
    pub check_interval: Duration,
    /// Shell assets warmed during install.
    pub shell_assets: Vec<String>,
    /// Whether the periodic re-check timer starts enabled.
    pub background_sync: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            shell_assets: Vec::new(),
            background_sync: true,
        }
    }
}

/// The background delivery agent.
pub struct BackgroundAgent {
    endpoint: BridgeEndpoint,
    cache: ShellCache,
    sink: Arc<dyn AlertSink>,
    config: AgentConfig,
    sync_enabled: bool,
    phase_tx: watch::Sender<AgentPhase>,
    token: CancellationToken,
}

impl BackgroundAgent {
    pub fn new(bridge: &AgentBridge, sink: Arc<dyn AlertSink>, config: AgentConfig) -> Self {
        let (phase_tx, _) = watch::channel(AgentPhase::Installed);
        Self {
            endpoint: bridge.agent(),
            cache: ShellCache::new(),
            sink,
            sync_enabled: config.background_sync,
            config,
            phase_tx,
            token: CancellationToken::new(),
        }
    }

    /// Observe lifecycle transitions.
    pub fn phase(&self) -> watch::Receiver<AgentPhase> {
        self.phase_tx.subscribe()
    }

    /// Token for stopping the agent from outside.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cache(&self) -> &ShellCache {
        &self.cache
    }

    /// Run the agent until cancelled.
    pub async fn run(mut self) {
        // Install: warm the shell cache. Not notification-critical, so
        // failures are absorbed inside prefetch.
        self.cache.prefetch(&self.config.shell_assets).await;

        let _ = self.phase_tx.send(AgentPhase::Activated);
        tracing::info!("Background agent activated");

        let mut rx = self.endpoint.subscribe();
        let _ = self.phase_tx.send(AgentPhase::Running);

        // A held interval keeps its schedule across loop iterations, so
        // steady bridge traffic cannot postpone the re-check.
        let mut check = tokio::time::interval(self.config.check_interval);
        check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        check.reset();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::info!("Background agent stopping");
                    break;
                }
                _ = check.tick(), if self.sync_enabled => {
                    self.tick();
                }
                msg = rx.recv() => match msg {
                    Ok(msg) => self.handle(msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Agent bridge lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Agent bridge closed, agent stopping");
                        break;
                    }
                },
            }
        }
    }

    /// Periodic tick: nudge a foreground context to re-check.
    fn tick(&self) {
        if self.endpoint.peer_count() == 0 {
            tracing::debug!("No foreground context attached, skipping re-check nudge");
            return;
        }
        self.endpoint.post(AgentMessage::check_notifications());
    }

    fn handle(&mut self, msg: AgentMessage) {
        // Unknown kinds decode to None and are ignored by design.
        let Some(command) = msg.decode() else { return };
        match command {
            AgentCommand::NewNotification(payload) => self.deliver(payload),
            AgentCommand::EnableBackgroundSync => {
                tracing::debug!("Background sync enabled");
                self.sync_enabled = true;
            }
            AgentCommand::DisableBackgroundSync => {
                tracing::debug!("Background sync disabled");
                self.sync_enabled = false;
            }
            // Addressed to foreground contexts; nothing to do here.
            AgentCommand::PlaySound
            | AgentCommand::StopSound
            | AgentCommand::CheckNotifications => {}
        }
    }

    /// Raise a platform alert and delegate sound to the foreground.
    ///
    /// Direct playback is not available in this context; if no
    /// foreground is attached the PLAY_SOUND post is dropped and the
    /// platform alert stands alone.
    fn deliver(&self, payload: PlatformAlertPayload) {
        if let Err(e) = self.sink.raise(&payload) {
            tracing::warn!(error = %e, "Platform alert rendering failed");
        }
        self.endpoint.post(AgentMessage::play_sound());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::RecordingAlertSink;

    fn payload() -> PlatformAlertPayload {
        PlatformAlertPayload::for_order("o1", "A-1001", "2x Carbonara", "/admin/orders/o1")
    }

    #[tokio::test]
    async fn test_push_delivery_without_foreground() {
        let bridge = AgentBridge::new(16);
        let sink = RecordingAlertSink::new();
        let agent = BackgroundAgent::new(&bridge, Arc::new(sink.clone()), AgentConfig::default());
        let mut phase = agent.phase();
        let token = agent.cancellation_token();
        let handle = tokio::spawn(agent.run());

        // Wait for the agent to come up.
        while *phase.borrow() != AgentPhase::Running {
            phase.changed().await.unwrap();
        }

        // No foreground endpoint subscribed; the platform alert must
        // still be raised by the agent alone.
        bridge.push_to_agent(AgentMessage::new_notification(&payload()));

        tokio::time::timeout(Duration::from_secs(1), async {
            while sink.raised().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("platform alert was not raised");

        assert_eq!(sink.raised()[0].data.order_number.as_deref(), Some("A-1001"));
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_recheck_nudges_foreground() {
        let config = AgentConfig {
            check_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let bridge = AgentBridge::new(16);
        let sink = RecordingAlertSink::new();
        let agent = BackgroundAgent::new(&bridge, Arc::new(sink), config);
        let token = agent.cancellation_token();
        tokio::spawn(agent.run());

        // Attach a fake foreground context.
        let foreground = bridge.foreground();
        let mut rx = foreground.subscribe();

        let msg = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("no re-check nudge within the tick window")
            .unwrap();
        assert_eq!(msg.decode(), Some(AgentCommand::CheckNotifications));
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_traffic_does_not_postpone_tick() {
        let config = AgentConfig {
            check_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let bridge = AgentBridge::new(64);
        let agent = BackgroundAgent::new(&bridge, Arc::new(RecordingAlertSink::new()), config);
        let token = agent.cancellation_token();
        tokio::spawn(agent.run());

        let foreground = bridge.foreground();
        let mut rx = foreground.subscribe();

        // Chatter arriving more often than the check interval must not
        // keep resetting it.
        for _ in 0..10 {
            bridge.push_to_agent(AgentMessage::new("HEARTBEAT", None));
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("re-check nudge was postponed by bridge traffic")
            .unwrap();
        assert_eq!(msg.decode(), Some(AgentCommand::CheckNotifications));
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_background_sync_stops_ticks() {
        let config = AgentConfig {
            check_interval: Duration::from_secs(30),
            background_sync: false,
            ..Default::default()
        };
        let bridge = AgentBridge::new(16);
        let agent = BackgroundAgent::new(&bridge, Arc::new(RecordingAlertSink::new()), config);
        let token = agent.cancellation_token();
        tokio::spawn(agent.run());

        let foreground = bridge.foreground();
        let mut rx = foreground.subscribe();

        // With sync disabled no nudge may arrive.
        let result = tokio::time::timeout(Duration::from_secs(90), rx.recv()).await;
        assert!(result.is_err(), "tick fired despite disabled sync");
        token.cancel();
    }
}
