//! Message bridge between foreground and agent contexts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     AgentBridge                      │
//! │  to_agent:      broadcast::Sender<AgentMessage>      │
//! │  to_foreground: broadcast::Sender<AgentMessage>      │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//!          ┌─────────────────┴─────────────────┐
//!          ▼                                   ▼
//!   foreground() endpoint              agent() endpoint
//!   post → to_agent                    post → to_foreground
//!   recv ← to_foreground               recv ← to_agent
//! ```
//!
//! Communication is message-passing only; the two contexts share no
//! mutable state. A post with no live peer is dropped silently (the
//! peer re-syncs through its own poll).

use shared::agent::AgentMessage;
use tokio::sync::broadcast;

/// Bidirectional channel pair carrying [`AgentMessage`] envelopes.
#[derive(Debug, Clone)]
pub struct AgentBridge {
    to_agent: broadcast::Sender<AgentMessage>,
    to_foreground: broadcast::Sender<AgentMessage>,
}

impl AgentBridge {
    pub fn new(capacity: usize) -> Self {
        let (to_agent, _) = broadcast::channel(capacity);
        let (to_foreground, _) = broadcast::channel(capacity);
        Self {
            to_agent,
            to_foreground,
        }
    }

    /// Endpoint handed to a foreground session.
    pub fn foreground(&self) -> BridgeEndpoint {
        BridgeEndpoint {
            tx: self.to_agent.clone(),
            rx: self.to_foreground.clone(),
        }
    }

    /// Endpoint owned by the background agent.
    pub fn agent(&self) -> BridgeEndpoint {
        BridgeEndpoint {
            tx: self.to_foreground.clone(),
            rx: self.to_agent.clone(),
        }
    }

    /// Push-service ingress: deliver a payload straight to the agent,
    /// bypassing any foreground context.
    pub fn push_to_agent(&self, msg: AgentMessage) {
        if self.to_agent.send(msg).is_err() {
            tracing::debug!("No agent listening for push message");
        }
    }
}

impl Default for AgentBridge {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One side of the bridge.
///
/// Posts go to the peer; `subscribe` yields messages addressed to this
/// side.
#[derive(Debug, Clone)]
pub struct BridgeEndpoint {
    tx: broadcast::Sender<AgentMessage>,
    rx: broadcast::Sender<AgentMessage>,
}

impl BridgeEndpoint {
    /// Fire-and-forget post to the peer context.
    pub fn post(&self, msg: AgentMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("No peer listening on agent bridge");
        }
    }

    /// Subscribe to messages addressed to this side.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentMessage> {
        self.rx.subscribe()
    }

    /// Number of live subscribers on the peer side.
    pub fn peer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::agent::AgentCommand;

    #[tokio::test]
    async fn test_endpoints_exchange_messages() {
        let bridge = AgentBridge::new(16);
        let foreground = bridge.foreground();
        let agent = bridge.agent();

        let mut agent_rx = agent.subscribe();
        let mut foreground_rx = foreground.subscribe();

        foreground.post(AgentMessage::enable_background_sync());
        agent.post(AgentMessage::check_notifications());

        assert_eq!(
            agent_rx.recv().await.unwrap().decode(),
            Some(AgentCommand::EnableBackgroundSync)
        );
        assert_eq!(
            foreground_rx.recv().await.unwrap().decode(),
            Some(AgentCommand::CheckNotifications)
        );
    }

    #[tokio::test]
    async fn test_post_without_peer_is_dropped() {
        let bridge = AgentBridge::new(16);
        // No subscriber on the agent side; must not panic or error.
        bridge.foreground().post(AgentMessage::play_sound());
        assert_eq!(bridge.foreground().peer_count(), 0);
    }
}
