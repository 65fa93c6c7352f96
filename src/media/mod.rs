//! Best-effort media enrichment for review drafts
//!
//! Enrichment runs after a draft passes validation and before persistence.
//! It is strictly best-effort: a failed or empty enrichment leaves the draft
//! without media and never fails the pipeline.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::models::{MediaItem, Product};

/// Supplies auxiliary media (images, clips) for a reviewed product
#[async_trait]
pub trait MediaEnricher: Send + Sync {
    async fn enrich(&self, product: &Product) -> Result<Vec<MediaItem>>;
}

/// Enricher that attaches the vendor's own product image when present
#[derive(Default)]
pub struct ProductImageEnricher;

#[async_trait]
impl MediaEnricher for ProductImageEnricher {
    async fn enrich(&self, product: &Product) -> Result<Vec<MediaItem>> {
        if product.product_image.is_empty() {
            debug!(product_id = %product.product_id, "No vendor image to attach");
            return Ok(Vec::new());
        }

        Ok(vec![MediaItem {
            url: product.product_image.clone(),
            source: "vendor".to_string(),
        }])
    }
}

/// Enricher that attaches nothing; for deployments without media
#[derive(Default)]
pub struct NoopEnricher;

#[async_trait]
impl MediaEnricher for NoopEnricher {
    async fn enrich(&self, _product: &Product) -> Result<Vec<MediaItem>> {
        Ok(Vec::new())
    }
}
