//! Persistence traits for the pipeline's external collaborators
//!
//! The pipeline treats storage as an external keyed document store reached
//! through narrow interfaces. Production deployments plug in their own
//! backends; [`memory`] provides the in-memory implementation used by tests
//! and the demo binary.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::error::Result;
use crate::models::{Product, ProductStatus, RetryJob, ReviewDraft};

pub use memory::{MemoryDraftStore, MemoryItemStore, MemoryRetryStore, StaticSettingsSource};

/// Keyed store for collected products
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch a product by natural key
    async fn get(&self, product_id: &str) -> Result<Option<Product>>;

    /// Insert a product. Returns `false` when the key already exists; the
    /// existing record is never overwritten.
    async fn put(&self, product: Product) -> Result<bool>;

    /// List products in a given lifecycle status, oldest first
    async fn list_by_status(&self, status: ProductStatus, limit: usize) -> Result<Vec<Product>>;

    /// Move a product to a new lifecycle status. Returns `false` when the
    /// product does not exist.
    async fn set_status(&self, product_id: &str, status: ProductStatus) -> Result<bool>;
}

/// Store for review drafts
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Persist a draft, returning its id
    async fn add(&self, draft: ReviewDraft) -> Result<String>;

    /// Delete every draft belonging to a product (regenerate path)
    async fn delete_for_product(&self, product_id: &str) -> Result<usize>;
}

/// Store for retry jobs with an optimistic claim guard
#[async_trait]
pub trait RetryStore: Send + Sync {
    async fn get(&self, product_id: &str) -> Result<Option<RetryJob>>;

    /// Insert or replace the job for its product key, bumping the version
    async fn upsert(&self, job: RetryJob) -> Result<()>;

    async fn delete(&self, product_id: &str) -> Result<()>;

    /// Jobs due at or before `now`, ascending by due time, bounded
    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RetryJob>>;

    /// Claim a job for processing. Succeeds only when the stored version
    /// still matches, so two concurrent sweepers cannot both win the same
    /// job.
    async fn claim(&self, product_id: &str, version: u64) -> Result<bool>;

    /// Count all pending jobs (cleanup/reporting)
    async fn count(&self) -> Result<usize>;
}

/// External source of the runtime settings snapshot.
///
/// Callers cache the snapshot themselves (5-minute TTL); the source is
/// consulted only on cache miss.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn get(&self) -> Result<Settings>;
}
