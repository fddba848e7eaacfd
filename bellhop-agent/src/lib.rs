//! Bellhop background delivery agent.
//!
//! A worker context with its own lifecycle that keeps order alerting
//! alive while no foreground session is visible. It exchanges typed
//! messages with foreground contexts over [`bridge::AgentBridge`] and
//! never talks to the data service itself.
//!
//! ```text
//! Push service ──▶ AgentBridge ──▶ BackgroundAgent ──▶ AlertSink
//!                      ▲                  │
//!                      │   CHECK_NOTIFICATIONS / PLAY_SOUND
//!                      ▼                  ▼
//!                Foreground session (bellhop-client)
//! ```

pub mod alerts;
pub mod bridge;
pub mod cache;
pub mod error;
pub mod lifecycle;

pub use alerts::{AlertSink, LogAlertSink, RecordingAlertSink};
pub use bridge::{AgentBridge, BridgeEndpoint};
pub use cache::{CachedAsset, ShellCache};
pub use error::AgentError;
pub use lifecycle::{AgentConfig, AgentPhase, BackgroundAgent};
