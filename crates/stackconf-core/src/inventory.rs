//! Inventory service trait.
//!
//! The inventory service is a Foreman-style REST API keyed by collection
//! name (`hosts`, `domains`, ...) and numeric record id.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

#[async_trait]
pub trait Inventory: Send + Sync {
    /// Look up one record whose name or title equals `name`.
    async fn search(&self, collection: &str, name: &str) -> Result<Option<Value>>;

    /// All records whose name contains `term`.
    async fn search_any(&self, collection: &str, term: &str) -> Result<Vec<Value>>;

    /// Create a record in `collection`.
    async fn post(&self, collection: &str, body: &Value) -> Result<Value>;

    /// Update the record at `path`.
    async fn put(&self, path: &str, body: &Value) -> Result<Value>;

    /// Delete the record at `path`.
    async fn delete(&self, path: &str) -> Result<Value>;
}
