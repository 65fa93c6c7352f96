//! haul - Affiliate product collection and review drafting pipeline
//!
//! An automation service that collects catalog items from an affiliate
//! e-commerce API across several discovery channels, turns new items into
//! AI-authored review drafts gated by content-quality checks, and retries
//! failed generations on an exponential backoff schedule.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration and runtime settings snapshots
//! - [`vendor`] - Signed HTTP client for the affiliate API
//! - [`collector`] - Quota allocation and multi-channel collection runs
//! - [`review`] - Prompt building, AI providers, and draft validation
//! - [`retry`] - Backoff scheduling for failed generations
//! - [`schedule`] - Time-of-day parsing and cron timer management
//! - [`store`] - Persistence traits and the in-memory backend
//! - [`notify`] - Fire-and-forget notification delivery
//! - [`service`] - The operations exposed to timers and callers
//!
//! # Example
//!
//! ```no_run
//! use haul::config::Settings;
//! use haul::collector::QuotaAllocator;
//!
//! let settings = Settings::default();
//! let allocator = QuotaAllocator::default();
//! let cap = allocator.cap(haul::collector::Channel::Goldbox, 10, 0);
//! assert_eq!(cap, 2);
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod notify;
pub mod retry;
pub mod review;
pub mod schedule;
pub mod service;
pub mod store;
pub mod vendor;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collector::{Channel, CollectionOrchestrator, QuotaAllocator};
    pub use crate::config::Settings;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{ChannelStats, Product, ProductStatus, RetryJob, ReviewDraft};
    pub use crate::service::AutomationService;
    pub use crate::vendor::SignedApiClient;
}

// Direct re-exports for convenience
pub use models::{ChannelStats, Product, ProductStatus, RetryJob, ReviewDraft};
