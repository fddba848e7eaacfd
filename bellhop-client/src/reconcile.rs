//! Order reconciliation.
//!
//! Decides which feed events belong to the current viewer and merges
//! them into the locally tracked sets. Push and poll deliveries race
//! and overlap, so every merge is idempotent: applying the same image
//! twice leaves the sets unchanged.

use std::collections::HashMap;

use shared::{Notification, Order, OrderPatch, OwnerRef};

/// The viewer's current credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    /// Anonymous client identifier, always present.
    pub client_id: String,
    /// Authenticated user id, when logged in.
    pub user_id: Option<String>,
}

impl Viewer {
    pub fn anonymous(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: None,
        }
    }

    pub fn authenticated(client_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: Some(user_id.into()),
        }
    }
}

/// Outcome of merging one record image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New record tracked.
    Inserted,
    /// Existing record updated in place.
    Updated,
    /// Identical image already held; no-op.
    Unchanged,
    /// Image older than the held record; ignored.
    Stale,
    /// Record does not belong to this viewer (or is an unusable
    /// partial image of an unknown record).
    Excluded,
}

/// Locally tracked orders, keyed by id.
#[derive(Debug, Default)]
pub struct OrderSet {
    orders: HashMap<String, Order>,
}

impl OrderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders sorted most recent first.
    pub fn recent(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

/// Applies the three-tier ownership predicate and performs merges.
#[derive(Debug)]
pub struct ReconciliationEngine {
    viewer: Viewer,
}

impl ReconciliationEngine {
    pub fn new(viewer: Viewer) -> Self {
        Self { viewer }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Swap credentials (anonymous → authenticated handoff). Already
    /// tracked orders stay tracked; tier 3 keeps their updates flowing.
    pub fn set_viewer(&mut self, viewer: Viewer) {
        self.viewer = viewer;
    }

    /// Three-tier inclusion predicate, evaluated in precedence order:
    ///
    /// 1. authenticated match on `owner.user_id`
    /// 2. anonymous match on `owner.client_id`
    /// 3. known-order fallback: the order id is already tracked
    ///
    /// Tier 3 exists because update images may omit `owner` entirely;
    /// dropping those events would lose legitimate updates, which is
    /// worse for a notification pipeline than the rare over-inclusion.
    pub fn includes(&self, owner: Option<&OwnerRef>, order_id: &str, tracked: &OrderSet) -> bool {
        if let Some(user_id) = self.viewer.user_id.as_deref()
            && let Some(owner) = owner
            && owner.user_id.as_deref() == Some(user_id)
        {
            return true;
        }
        if let Some(owner) = owner
            && owner.client_id.as_deref() == Some(self.viewer.client_id.as_str())
        {
            return true;
        }
        tracked.contains(order_id)
    }

    /// Merge a (possibly partial) order image into the tracked set.
    ///
    /// The existing order is updated in place rather than replaced, so
    /// locally materialized line items survive partial images.
    /// Last-writer-wins on `updated_at`: a stale image can never roll
    /// back a newer one.
    pub fn merge_order(&self, tracked: &mut OrderSet, patch: OrderPatch) -> MergeOutcome {
        if !self.includes(patch.owner.as_ref(), &patch.id, tracked) {
            return MergeOutcome::Excluded;
        }

        match tracked.orders.get_mut(&patch.id) {
            Some(existing) => {
                if let Some(ts) = patch.updated_at
                    && ts < existing.updated_at
                {
                    return MergeOutcome::Stale;
                }
                let before = existing.clone();
                apply_patch(existing, patch);
                if *existing == before {
                    MergeOutcome::Unchanged
                } else {
                    MergeOutcome::Updated
                }
            }
            None => match patch.into_order() {
                Some(order) => {
                    tracked.orders.insert(order.id.clone(), order);
                    MergeOutcome::Inserted
                }
                None => {
                    // Partial image of an order we never tracked; there
                    // is nothing to update in place.
                    tracing::debug!("Dropping partial image of untracked order");
                    MergeOutcome::Excluded
                }
            },
        }
    }
}

fn apply_patch(order: &mut Order, patch: OrderPatch) {
    if let Some(v) = patch.order_number {
        order.order_number = v;
    }
    if let Some(v) = patch.customer {
        order.customer = v;
    }
    if let Some(v) = patch.total_amount {
        order.total_amount = v;
    }
    if let Some(v) = patch.status {
        order.status = v;
    }
    if let Some(v) = patch.payment_status {
        order.payment_status = v;
    }
    if let Some(v) = patch.owner {
        order.owner = v;
    }
    if patch.admin_read_at.is_some() {
        order.admin_read_at = patch.admin_read_at;
    }
    if patch.admin_done_at.is_some() {
        order.admin_done_at = patch.admin_done_at;
    }
    if let Some(v) = patch.updated_at {
        order.updated_at = v;
    }
    // Line items survive images that omit them.
    if let Some(v) = patch.items {
        order.items = v;
    }
}

/// Locally tracked notifications, keyed by id.
#[derive(Debug, Default)]
pub struct NotificationSet {
    items: HashMap<String, Notification>,
}

impl NotificationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent merge. `is_read` and `is_acknowledged` are monotonic:
    /// a stale image can never un-read a notification.
    pub fn merge(&mut self, incoming: Notification) -> MergeOutcome {
        match self.items.get_mut(&incoming.id) {
            Some(existing) => {
                let mut merged = incoming;
                merged.is_read |= existing.is_read;
                merged.is_acknowledged |= existing.is_acknowledged;
                if merged == *existing {
                    MergeOutcome::Unchanged
                } else {
                    *existing = merged;
                    MergeOutcome::Updated
                }
            }
            None => {
                self.items.insert(incoming.id.clone(), incoming);
                MergeOutcome::Inserted
            }
        }
    }

    /// Unread notification ids, most recent first.
    pub fn unread_ids(&self) -> Vec<String> {
        let mut unread: Vec<&Notification> =
            self.items.values().filter(|n| !n.is_read).collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread.into_iter().map(|n| n.id.clone()).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.items.values().filter(|n| !n.is_read).count()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.get(id)
    }

    /// Most recent unread notification, if any.
    pub fn latest_unread(&self) -> Option<&Notification> {
        self.items
            .values()
            .filter(|n| !n.is_read)
            .max_by_key(|n| n.created_at)
    }

    /// Flag everything read locally; returns the ids that flipped.
    pub fn mark_all_read(&mut self) -> Vec<String> {
        let mut flipped = Vec::new();
        for notification in self.items.values_mut() {
            if !notification.is_read {
                notification.is_read = true;
                flipped.push(notification.id.clone());
            }
        }
        flipped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
