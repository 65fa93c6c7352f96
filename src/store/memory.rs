//! In-memory store implementations
//!
//! Thread-safe map-backed stores used by the test suite and the demo binary.
//! They honor the same contracts as a real backend: idempotent product
//! inserts, versioned retry-job claims, and due-time ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::error::Result;
use crate::models::{Product, ProductStatus, RetryJob, ReviewDraft};
use crate::store::{DraftStore, ItemStore, RetryStore, SettingsSource};

/// Map-backed product store
#[derive(Default)]
pub struct MemoryItemStore {
    products: RwLock<HashMap<String, Product>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }

    pub async fn remove(&self, product_id: &str) -> Option<Product> {
        self.products.write().await.remove(product_id)
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn put(&self, product: Product) -> Result<bool> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.product_id) {
            // Duplicate natural key: benign, report "not newly saved"
            return Ok(false);
        }
        products.insert(product.product_id.clone(), product);
        Ok(true)
    }

    async fn list_by_status(&self, status: ProductStatus, limit: usize) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut matching: Vec<Product> = products
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn set_status(&self, product_id: &str, status: ProductStatus) -> Result<bool> {
        let mut products = self.products.write().await;
        match products.get_mut(product_id) {
            Some(product) => {
                product.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Map-backed draft store
#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: RwLock<HashMap<String, ReviewDraft>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<ReviewDraft> {
        self.drafts.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn for_product(&self, product_id: &str) -> Vec<ReviewDraft> {
        self.drafts
            .read()
            .await
            .values()
            .filter(|d| d.product_id == product_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn add(&self, draft: ReviewDraft) -> Result<String> {
        let id = draft.id.clone();
        self.drafts.write().await.insert(id.clone(), draft);
        Ok(id)
    }

    async fn delete_for_product(&self, product_id: &str) -> Result<usize> {
        let mut drafts = self.drafts.write().await;
        let before = drafts.len();
        drafts.retain(|_, d| d.product_id != product_id);
        Ok(before - drafts.len())
    }
}

/// Map-backed retry store with versioned claims
#[derive(Default)]
pub struct MemoryRetryStore {
    jobs: RwLock<HashMap<String, RetryJob>>,
}

impl MemoryRetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryStore for MemoryRetryStore {
    async fn get(&self, product_id: &str) -> Result<Option<RetryJob>> {
        Ok(self.jobs.read().await.get(product_id).cloned())
    }

    async fn upsert(&self, mut job: RetryJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let next_version = jobs
            .get(&job.product_id)
            .map(|existing| existing.version + 1)
            .unwrap_or(1);
        job.version = next_version;
        jobs.insert(job.product_id.clone(), job);
        Ok(())
    }

    async fn delete(&self, product_id: &str) -> Result<()> {
        self.jobs.write().await.remove(product_id);
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RetryJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<RetryJob> = jobs
            .values()
            .filter(|j| j.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim(&self, product_id: &str, version: u64) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(product_id) {
            Some(job) if job.version == version => {
                job.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.jobs.read().await.len())
    }
}

/// Settings source returning a fixed snapshot
///
/// Stands in for the external settings document in tests; swap the snapshot
/// with [`StaticSettingsSource::replace`] to simulate an admin edit.
pub struct StaticSettingsSource {
    settings: RwLock<Settings>,
}

impl StaticSettingsSource {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub async fn replace(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }
}

#[async_trait]
impl SettingsSource for StaticSettingsSource {
    async fn get(&self) -> Result<Settings> {
        Ok(self.settings.read().await.clone())
    }
}
