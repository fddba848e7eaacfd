//! Notification model.

use serde::{Deserialize, Serialize};

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new order was placed.
    NewOrder,
    /// An order's status changed.
    StatusChange,
    /// System-level notice.
    System,
}

/// Notification row, created by a server-side trigger on order insert.
///
/// The pipeline only ever flips `is_read`; everything else is written by
/// the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_acknowledged: bool,
    pub created_at: i64,
}

impl Notification {
    /// Notification for a freshly placed order.
    pub fn new_order(
        id: impl Into<String>,
        order_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            order_id: Some(order_id.into()),
            kind: NotificationKind::NewOrder,
            title: Some("New order".into()),
            message: message.into(),
            is_read: false,
            is_acknowledged: false,
            created_at: crate::util::now_millis(),
        }
    }

    /// System notice not tied to any order.
    pub fn system(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order_id: None,
            kind: NotificationKind::System,
            title: None,
            message: message.into(),
            is_read: false,
            is_acknowledged: false,
            created_at: crate::util::now_millis(),
        }
    }
}
