//! Permission request persistence.
//!
//! The webhook only ever performs one keyed merge-write per matched command:
//!
//! ```text
//! permissionRequests/{userId} ← { approved: false, requestedAt: now }
//! ```
//!
//! Approval is flipped by an admin process outside this service.

pub mod firestore;
pub mod memory;
pub mod token;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;

use crate::config::FirestoreConfig;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use token::TokenProvider;

/// The fields written for a permission request.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    pub approved: bool,
    pub requested_at: DateTime<Utc>,
}

impl PermissionRequest {
    /// A fresh, unapproved request stamped with the current time.
    pub fn pending_now() -> Self {
        Self {
            approved: false,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid document key: {0:?}")]
    InvalidKey(String),

    #[error("invalid store url: {0}")]
    Url(#[from] url::ParseError),

    #[error("store base url cannot carry a path: {0}")]
    BaseUrl(String),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("token assertion signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token endpoint returned status {status}: {body}")]
    TokenStatus { status: u16, body: String },
}

/// A document store supporting a keyed merge-write.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Write `request` under `user_id`, overwriting only `approved` and
    /// `requestedAt` and preserving every other field on the document.
    async fn merge_permission_request(
        &self,
        user_id: &str,
        request: &PermissionRequest,
    ) -> Result<(), StoreError>;
}

static SHARED_STORE: OnceCell<Arc<FirestoreStore>> = OnceCell::new();

/// Process-wide Firestore client, created on first call.
///
/// Later calls return the same client and ignore `config`.
pub fn init_shared(
    config: &FirestoreConfig,
    timeout_ms: u64,
) -> Result<Arc<FirestoreStore>, StoreError> {
    SHARED_STORE
        .get_or_try_init(|| FirestoreStore::new(config.clone(), timeout_ms).map(Arc::new))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FirestoreAuth;

    fn firestore_config() -> FirestoreConfig {
        FirestoreConfig {
            project_id: "demo".to_string(),
            auth: FirestoreAuth::Emulator { token: None },
            base_url: "http://localhost:8681".to_string(),
            collection: "permissionRequests".to_string(),
        }
    }

    #[test]
    fn test_init_shared_is_once() {
        let first = init_shared(&firestore_config(), 1000).unwrap();

        let mut other = firestore_config();
        other.project_id = "other".to_string();
        let second = init_shared(&other, 1000).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_pending_now_is_unapproved() {
        let before = Utc::now();
        let request = PermissionRequest::pending_now();
        assert!(!request.approved);
        assert!(request.requested_at >= before);
    }
}
