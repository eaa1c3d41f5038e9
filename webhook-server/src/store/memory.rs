//! In-process permission store with document merge semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{PermissionRequest, PermissionStore, StoreError};

/// Documents keyed by user id, each a JSON object.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a whole document.
    pub fn insert_document(&self, user_id: &str, document: Map<String, Value>) {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), document);
    }

    pub fn document(&self, user_id: &str) -> Option<Map<String, Value>> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    /// User ids of every merge-write, in call order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn merge_permission_request(
        &self,
        user_id: &str,
        request: &PermissionRequest,
    ) -> Result<(), StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::InvalidKey(user_id.to_string()));
        }

        {
            let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
            let document = documents.entry(user_id.to_string()).or_default();
            document.insert("approved".to_string(), Value::Bool(request.approved));
            document.insert(
                "requestedAt".to_string(),
                Value::String(request.requested_at.to_rfc3339()),
            );
        }

        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_id.to_string());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_merge_creates_document() {
        let store = MemoryStore::new();
        let request = PermissionRequest::pending_now();

        store.merge_permission_request("U1", &request).await.unwrap();

        let doc = store.document("U1").unwrap();
        assert_eq!(doc["approved"], json!(false));
        assert_eq!(doc["requestedAt"], json!(request.requested_at.to_rfc3339()));
        assert_eq!(store.writes(), vec!["U1".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_preserves_other_fields() {
        let store = MemoryStore::new();
        let mut existing = Map::new();
        existing.insert("approved".to_string(), json!(true));
        existing.insert("displayName".to_string(), json!("Alice"));
        store.insert_document("U1", existing);

        let first = PermissionRequest {
            approved: false,
            requested_at: Utc::now() - Duration::minutes(5),
        };
        let second = PermissionRequest::pending_now();

        store.merge_permission_request("U1", &first).await.unwrap();
        store.merge_permission_request("U1", &second).await.unwrap();

        let doc = store.document("U1").unwrap();
        assert_eq!(doc["displayName"], json!("Alice"));
        assert_eq!(doc["approved"], json!(false));
        assert_eq!(doc["requestedAt"], json!(second.requested_at.to_rfc3339()));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_merge_rejects_empty_key() {
        let store = MemoryStore::new();
        let result = store
            .merge_permission_request("", &PermissionRequest::pending_now())
            .await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
        assert!(store.writes().is_empty());
    }
}
