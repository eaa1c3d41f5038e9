//! Storebot - multi-store LINE webhook server.
//!
//! Receives LINE webhook deliveries per store, records permission requests
//! and acknowledges them with a fixed reply. Also ships a small HTML
//! watermark helper used by the store's pages.
//!
//! ## Architecture
//!
//! ```text
//! LINE → /webhooks/line/:store → signature check → events → Firestore merge → reply
//! ```

pub mod config;
pub mod line;
pub mod store;
pub mod watermark;
pub mod web;

// Re-export commonly used types
pub use config::{Config, TenantConfig};
pub use line::{LineClient, Messenger};
pub use store::{FirestoreStore, MemoryStore, PermissionRequest, PermissionStore};
pub use web::{router, AppState};
