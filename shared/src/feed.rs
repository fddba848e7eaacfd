//! Change feed event types.
//!
//! Each event carries the full (or, for updates, possibly partial) new
//! row image of one record. Payloads are validated here at the
//! boundary: a row that does not parse into a known record shape is
//! rejected, never silently defaulted.

use serde::{Deserialize, Serialize};

use crate::notification::Notification;
use crate::order::{Order, OrderPatch};

/// Row-level mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
}

/// Record sets the pipeline subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSet {
    Orders,
    Notifications,
}

/// Row image, tagged by record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_set", content = "row", rename_all = "snake_case")]
pub enum FeedRecord {
    #[serde(rename = "orders")]
    Order(OrderPatch),
    #[serde(rename = "notifications")]
    Notification(Notification),
}

/// One mutation event from the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    #[serde(flatten)]
    pub record: FeedRecord,
}

impl ChangeEvent {
    /// INSERT of a full order row.
    pub fn order_insert(order: Order) -> Self {
        Self {
            action: ChangeAction::Insert,
            record: FeedRecord::Order(OrderPatch::from(order)),
        }
    }

    /// UPDATE carrying a possibly partial order row image.
    pub fn order_update(patch: OrderPatch) -> Self {
        Self {
            action: ChangeAction::Update,
            record: FeedRecord::Order(patch),
        }
    }

    /// INSERT of a notification row.
    pub fn notification_insert(notification: Notification) -> Self {
        Self {
            action: ChangeAction::Insert,
            record: FeedRecord::Notification(notification),
        }
    }

    /// UPDATE of a notification row.
    pub fn notification_update(notification: Notification) -> Self {
        Self {
            action: ChangeAction::Update,
            record: FeedRecord::Notification(notification),
        }
    }

    pub fn record_set(&self) -> RecordSet {
        match self.record {
            FeedRecord::Order(_) => RecordSet::Orders,
            FeedRecord::Notification(_) => RecordSet::Notifications,
        }
    }

    /// Parse a raw feed payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification_insert() {
        let json = r#"{
            "action": "INSERT",
            "record_set": "notifications",
            "row": {"id":"n1","order_id":"o1","kind":"new_order","message":"Order A-1001","created_at":5}
        }"#;
        let event = ChangeEvent::from_json(json.as_bytes()).unwrap();
        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.record_set(), RecordSet::Notifications);
    }

    #[test]
    fn test_parse_partial_order_update() {
        let json = r#"{
            "action": "UPDATE",
            "record_set": "orders",
            "row": {"id":"o1","status":"ready","updated_at":9}
        }"#;
        let event = ChangeEvent::from_json(json.as_bytes()).unwrap();
        match event.record {
            FeedRecord::Order(patch) => {
                assert!(patch.owner.is_none());
                assert_eq!(patch.updated_at, Some(9));
            }
            _ => panic!("expected order record"),
        }
    }

    #[test]
    fn test_malformed_payload_rejected() {
        // Unknown record set must fail to parse, not default to something.
        let json = r#"{"action":"INSERT","record_set":"opening_hours","row":{}}"#;
        assert!(ChangeEvent::from_json(json.as_bytes()).is_err());
        // Missing mandatory row fields likewise.
        let json = r#"{"action":"INSERT","record_set":"notifications","row":{"id":"n1"}}"#;
        assert!(ChangeEvent::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ChangeEvent::notification_insert(Notification::system("n9", "maintenance"));
        let bytes = serde_json::to_vec(&event).unwrap();
        assert_eq!(ChangeEvent::from_json(&bytes).unwrap(), event);
    }
}
