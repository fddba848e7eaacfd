//! Order model.

use serde::{Deserialize, Serialize};

/// Order lifecycle status, driven by staff-side transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Arrived,
    Delivered,
    Cancelled,
}

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

/// Which visitor session created an order.
///
/// Either an authenticated user id or the anonymous client id. Update
/// payloads from the change feed may omit both, which is exactly what
/// the known-order fallback in reconciliation covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl OwnerRef {
    /// Owned by an authenticated user.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            client_id: None,
        }
    }

    /// Owned by an anonymous browsing session.
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            client_id: Some(id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.client_id.is_none()
    }
}

/// Customer contact details captured by the checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Order line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    /// Unit price in currency unit.
    pub price: f64,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Order entity as mirrored locally.
///
/// Created by the external checkout flow, mutated by staff-side status
/// transitions. The pipeline never deletes orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer: CustomerInfo,
    /// Total amount in currency unit.
    pub total_amount: f64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub owner: OwnerRef,
    /// When staff first opened the order (UTC millis).
    pub admin_read_at: Option<i64>,
    /// When staff marked the order handled (UTC millis).
    pub admin_done_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Partial row image delivered by UPDATE feed events.
///
/// Everything except `id` is optional. `owner` in particular may be
/// absent on updates, so reconciliation must not require it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub id: String,
    pub order_number: Option<String>,
    pub customer: Option<CustomerInfo>,
    pub total_amount: Option<f64>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub owner: Option<OwnerRef>,
    pub admin_read_at: Option<i64>,
    pub admin_done_at: Option<i64>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub items: Option<Vec<OrderItem>>,
}

impl From<Order> for OrderPatch {
    /// Full row image (INSERT events and poll snapshots).
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: Some(order.order_number),
            customer: Some(order.customer),
            total_amount: Some(order.total_amount),
            status: Some(order.status),
            payment_status: Some(order.payment_status),
            owner: Some(order.owner),
            admin_read_at: order.admin_read_at,
            admin_done_at: order.admin_done_at,
            created_at: Some(order.created_at),
            updated_at: Some(order.updated_at),
            items: Some(order.items),
        }
    }
}

impl OrderPatch {
    /// Materialize a full order from an insert image.
    ///
    /// Returns `None` when mandatory fields are missing, which marks the
    /// payload as malformed (an insert always carries the full row).
    pub fn into_order(self) -> Option<Order> {
        Some(Order {
            id: self.id,
            order_number: self.order_number?,
            customer: self.customer?,
            total_amount: self.total_amount?,
            status: self.status.unwrap_or_default(),
            payment_status: self.payment_status.unwrap_or_default(),
            owner: self.owner.unwrap_or_default(),
            admin_read_at: self.admin_read_at,
            admin_done_at: self.admin_done_at,
            created_at: self.created_at?,
            updated_at: self.updated_at.or(self.created_at)?,
            items: self.items.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: "ord_1".into(),
            order_number: "A-1001".into(),
            customer: CustomerInfo {
                name: "Walk-in".into(),
                phone: None,
                note: None,
            },
            total_amount: 24.5,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            owner: OwnerRef::client("c1"),
            admin_read_at: None,
            admin_done_at: None,
            created_at: 1_000,
            updated_at: 1_000,
            items: vec![],
        }
    }

    #[test]
    fn test_partial_patch_deserializes() {
        // Update payloads routinely carry only id + changed fields.
        let patch: OrderPatch =
            serde_json::from_str(r#"{"id":"ord_1","status":"ready","updated_at":2000}"#).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Ready));
        assert!(patch.owner.is_none());
        assert!(patch.into_order().is_none());
    }

    #[test]
    fn test_full_image_materializes() {
        let patch = OrderPatch::from(sample_order());
        let order = patch.into_order().unwrap();
        assert_eq!(order.order_number, "A-1001");
        assert_eq!(order.owner, OwnerRef::client("c1"));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Preparing).unwrap(),
            "\"preparing\""
        );
    }
}
