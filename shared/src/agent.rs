//! Foreground <-> background agent message protocol.
//!
//! Every message is a JSON envelope with a mandatory `type` string and
//! an optional `data` object, delivered in both directions between the
//! foreground session and the background agent. Receivers ignore
//! unknown kinds instead of erroring, so the two contexts can be
//! upgraded independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version, bumped on incompatible envelope changes.
pub const PROTOCOL_VERSION: u16 = 1;

/// Raw message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Decoded commands both contexts understand.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    /// Foreground should start the audible alert.
    PlaySound,
    /// Foreground should stop the audible alert.
    StopSound,
    /// Foreground should re-check notifications now.
    CheckNotifications,
    /// A new notification arrived; carries the alert payload.
    NewNotification(PlatformAlertPayload),
    /// Agent should resume its periodic re-check timer.
    EnableBackgroundSync,
    /// Agent should pause its periodic re-check timer.
    DisableBackgroundSync,
}

impl AgentMessage {
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn play_sound() -> Self {
        Self::new("PLAY_SOUND", None)
    }

    pub fn stop_sound() -> Self {
        Self::new("STOP_SOUND", None)
    }

    pub fn check_notifications() -> Self {
        Self::new("CHECK_NOTIFICATIONS", None)
    }

    pub fn new_notification(payload: &PlatformAlertPayload) -> Self {
        Self::new(
            "NEW_NOTIFICATION",
            Some(serde_json::to_value(payload).expect("Failed to serialize alert payload")),
        )
    }

    pub fn enable_background_sync() -> Self {
        Self::new("ENABLE_BACKGROUND_SYNC", None)
    }

    pub fn disable_background_sync() -> Self {
        Self::new("DISABLE_BACKGROUND_SYNC", None)
    }

    /// Decode into a known command.
    ///
    /// Unknown kinds and malformed payloads yield `None` (logged, never
    /// an error).
    pub fn decode(&self) -> Option<AgentCommand> {
        match self.kind.as_str() {
            "PLAY_SOUND" => Some(AgentCommand::PlaySound),
            "STOP_SOUND" => Some(AgentCommand::StopSound),
            "CHECK_NOTIFICATIONS" => Some(AgentCommand::CheckNotifications),
            "ENABLE_BACKGROUND_SYNC" => Some(AgentCommand::EnableBackgroundSync),
            "DISABLE_BACKGROUND_SYNC" => Some(AgentCommand::DisableBackgroundSync),
            "NEW_NOTIFICATION" => {
                let data = self.data.clone()?;
                match serde_json::from_value(data) {
                    Ok(payload) => Some(AgentCommand::NewNotification(payload)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed NEW_NOTIFICATION payload, dropping");
                        None
                    }
                }
            }
            other => {
                tracing::debug!(kind = %other, "Unknown agent message kind, ignoring");
                None
            }
        }
    }

    /// Serialize for wire transfer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Platform alert payload (push service / foreground -> background agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformAlertPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
    pub data: AlertData,
}

/// Actionable button on a platform alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAction {
    pub action: String,
    pub title: String,
}

/// Navigation context attached to a platform alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertData {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl PlatformAlertPayload {
    /// Standard alert for a new order, with view/dismiss actions.
    pub fn for_order(
        order_id: impl Into<String>,
        order_number: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let order_number = order_number.into();
        Self {
            title: format!("New order {order_number}"),
            body: body.into(),
            icon: None,
            actions: vec![
                AlertAction {
                    action: "view".into(),
                    title: "View".into(),
                },
                AlertAction {
                    action: "dismiss".into(),
                    title: "Dismiss".into(),
                },
            ],
            data: AlertData {
                url: url.into(),
                order_id: Some(order_id.into()),
                order_number: Some(order_number),
            },
        }
    }

    /// Alert with no order context, e.g. a storefront announcement.
    /// Navigates to the order overview instead of a single order.
    pub fn announcement(body: impl Into<String>) -> Self {
        Self {
            title: "Announcement".into(),
            body: body.into(),
            icon: None,
            actions: vec![AlertAction {
                action: "view".into(),
                title: "View".into(),
            }],
            data: AlertData {
                url: "/orders".into(),
                order_id: None,
                order_number: None,
            },
        }
    }
}
