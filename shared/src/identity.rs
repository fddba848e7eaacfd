//! Anonymous client identity.

use serde::{Deserialize, Serialize};

/// Stable anonymous identifier for a browsing session.
///
/// Generated once, persisted locally and regenerated only if the local
/// state directory is cleared. There is no server authority over this
/// value; the backend only ever echoes it back inside [`OwnerRef`]
/// fields.
///
/// [`OwnerRef`]: crate::order::OwnerRef
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    /// Creation time (UTC millis).
    pub created_at: i64,
}

impl ClientIdentity {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            created_at: crate::util::now_millis(),
        }
    }
}
