//! Firestore REST client for permission requests.
//!
//! Uses `documents.patch` with an update mask, which gives merge semantics:
//! only the masked fields are written and the document is created if absent.
//! Reference: https://firebase.google.com/docs/firestore/reference/rest/v1/projects.databases.documents/patch

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use super::{PermissionRequest, PermissionStore, StoreError, TokenProvider};
use crate::config::FirestoreConfig;

/// Fields overwritten by a permission request merge.
const MERGE_FIELDS: [&str; 2] = ["approved", "requestedAt"];

/// Firestore-backed permission store.
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
    tokens: TokenProvider,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig, timeout_ms: u64) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        let tokens = TokenProvider::new(client.clone(), &config.auth)?;

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// Build the document URL including the update mask.
    fn document_url(&self, user_id: &str) -> Result<Url, StoreError> {
        if user_id.is_empty() || user_id.contains('/') {
            return Err(StoreError::InvalidKey(user_id.to_string()));
        }

        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| StoreError::BaseUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.config.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                self.config.collection.as_str(),
                user_id,
            ]);

        {
            let mut query = url.query_pairs_mut();
            for field in MERGE_FIELDS {
                query.append_pair("updateMask.fieldPaths", field);
            }
        }

        Ok(url)
    }
}

/// Encode a permission request as a Firestore document body.
fn document_body(request: &PermissionRequest) -> Value {
    json!({
        "fields": {
            "approved": { "booleanValue": request.approved },
            "requestedAt": {
                "timestampValue": request.requested_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            }
        }
    })
}

#[async_trait]
impl PermissionStore for FirestoreStore {
    async fn merge_permission_request(
        &self,
        user_id: &str,
        request: &PermissionRequest,
    ) -> Result<(), StoreError> {
        let url = self.document_url(user_id)?;

        let mut builder = self.client.patch(url).json(&document_body(request));
        if let Some(token) = self.tokens.token().await? {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                user_id = %user_id,
                status_code = status.as_u16(),
                "firestore_merge_failed"
            );
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            user_id = %user_id,
            collection = %self.config.collection,
            "firestore_permission_request_merged"
        );

        Ok(())
    }
}
