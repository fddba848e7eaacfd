//! Platform alert rendering.

use std::sync::{Arc, Mutex};

use shared::agent::PlatformAlertPayload;

use crate::error::AgentResult;

/// Renders platform-level alerts (title/body/actions).
///
/// The agent stays portable by not binding to one desktop notification
/// backend; embedders plug their platform's renderer in here.
pub trait AlertSink: Send + Sync {
    fn raise(&self, payload: &PlatformAlertPayload) -> AgentResult<()>;
}

/// Default sink: structured log events.
///
/// Headless deployments keep this; desktop builds replace it.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, payload: &PlatformAlertPayload) -> AgentResult<()> {
        tracing::info!(
            title = %payload.title,
            body = %payload.body,
            order_number = payload.data.order_number.as_deref().unwrap_or("-"),
            url = %payload.data.url,
            "Platform alert raised"
        );
        Ok(())
    }
}

/// Records raised alerts for inspection in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingAlertSink {
    raised: Arc<Mutex<Vec<PlatformAlertPayload>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raised(&self) -> Vec<PlatformAlertPayload> {
        self.raised.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn raise(&self, payload: &PlatformAlertPayload) -> AgentResult<()> {
        self.raised.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
