//! Backend data store abstraction.
//!
//! The polling loop and the acknowledgement path both go through
//! [`DataStore`]. The in-memory implementation backs tests and demos;
//! the REST implementation lives in [`crate::http`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use shared::{Notification, Order};

use crate::error::PipelineResult;
use crate::reconcile::Viewer;

/// Read/write access to the backend's notification and order rows.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Unread notifications, most recent first, capped at `limit`.
    async fn fetch_unread_notifications(&self, limit: usize) -> PipelineResult<Vec<Notification>>;

    /// Orders visible to the viewer, most recent first, capped at `limit`.
    async fn fetch_orders(&self, viewer: &Viewer, limit: usize) -> PipelineResult<Vec<Order>>;

    /// Flag the given notifications read. Best effort: the local sets
    /// are updated before this call and stay read even if it fails.
    async fn mark_notifications_read(&self, ids: &[String]) -> PipelineResult<()>;
}

/// In-process store over concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    notifications: Arc<DashMap<String, Notification>>,
    orders: Arc<DashMap<String, Order>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_notification(&self, notification: Notification) {
        self.notifications
            .insert(notification.id.clone(), notification);
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn notification(&self, id: &str) -> Option<Notification> {
        self.notifications.get(id).map(|n| n.clone())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn fetch_unread_notifications(&self, limit: usize) -> PipelineResult<Vec<Notification>> {
        let mut unread: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| !entry.is_read)
            .map(|entry| entry.clone())
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread.truncate(limit);
        Ok(unread)
    }

    async fn fetch_orders(&self, viewer: &Viewer, limit: usize) -> PipelineResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let owner = &entry.owner;
                if let Some(user_id) = viewer.user_id.as_deref()
                    && owner.user_id.as_deref() == Some(user_id)
                {
                    return true;
                }
                owner.client_id.as_deref() == Some(viewer.client_id.as_str())
            })
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn mark_notifications_read(&self, ids: &[String]) -> PipelineResult<()> {
        for id in ids {
            if let Some(mut entry) = self.notifications.get_mut(id) {
                entry.is_read = true;
            }
        }
        Ok(())
    }
}
