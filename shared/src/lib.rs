//! Shared types for the bellhop order notification pipeline.
//!
//! These types are shared between the foreground client and the
//! background agent, for both in-process (memory) and wire (JSON)
//! exchange.

pub mod agent;
pub mod feed;
pub mod identity;
pub mod notification;
pub mod order;
pub mod util;

pub use agent::{AgentCommand, AgentMessage, AlertAction, AlertData, PlatformAlertPayload};
pub use feed::{ChangeAction, ChangeEvent, FeedRecord, RecordSet};
pub use identity::ClientIdentity;
pub use notification::{Notification, NotificationKind};
pub use order::{
    CustomerInfo, Order, OrderItem, OrderPatch, OrderStatus, OwnerRef, PaymentStatus,
};
