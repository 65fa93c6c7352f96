// Core data structures for the haul pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered catalog entry, keyed by the vendor's product id.
///
/// The natural key is globally unique: inserting an existing key is a no-op
/// that reports "not newly saved", never an overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Vendor product id (natural key)
    pub product_id: String,
    pub product_name: String,
    pub product_price: i64,
    pub product_image: String,
    pub product_url: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    /// Vendor URL rewritten to embed the affiliate tracking id
    pub affiliate_url: String,
    /// Discovery channel tag, e.g. `keyword:가습기`, `category:1016`, `goldbox`
    pub source: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a collected product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// An unpublished AI-generated review awaiting human approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub id: String,
    /// Natural key of the reviewed product
    pub product_id: String,
    pub content: String,
    pub status: DraftStatus,
    /// Lexicon-based sentiment ratio in `[0, 1]`; gated before persistence
    pub tone_score: f64,
    /// Character count by code point, not byte
    pub char_count: usize,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Workflow status of a review draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    NeedsRevision,
    Approved,
    Published,
}

/// Auxiliary media attached to a draft by the enrichment collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    /// Where the media came from, e.g. `stock`, `ai`, `vendor-detail`
    pub source: String,
}

/// A persisted record of a failed generation and its next scheduled retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJob {
    /// Natural key of the product being retried
    pub product_id: String,
    /// Attempt count, monotonically non-decreasing across updates
    pub attempt: u32,
    /// Strictly in the future at creation/update time
    pub next_attempt_at: DateTime<Utc>,
    pub reason: String,
    pub status: RetryStatus,
    /// Optimistic-concurrency guard for the sweep claim
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Status of a retry job (a job past the attempt ceiling is deleted, not kept)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    RetryPending,
}

/// Per-channel collection counts for a single run
///
/// Always defined, even under partial failure: a failed channel simply
/// contributes zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub goldbox: usize,
    pub categories: usize,
    pub keywords: usize,
    pub brands: usize,
}

impl ChannelStats {
    pub fn total(&self) -> usize {
        self.goldbox + self.categories + self.keywords + self.brands
    }
}

/// Result of a collection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectOutcome {
    pub collected: usize,
    pub stats: ChannelStats,
}

impl CollectOutcome {
    pub fn empty() -> Self {
        Self {
            collected: 0,
            stats: ChannelStats::default(),
        }
    }
}

/// Result of a successful review generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub draft_id: String,
    pub tone_score: f64,
    pub char_count: usize,
    pub provider: String,
    pub model: String,
}
