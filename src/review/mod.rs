//! AI review generation
//!
//! One generation pass: render the prompt, call the configured provider,
//! run the quality gates, enrich with media, then replace any earlier drafts
//! for the product. The pipeline itself never retries; a failure is reported
//! to the caller, who hands it to the retry scheduler.

pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod validate;

pub use pipeline::ReviewPipeline;
pub use prompt::build_review_prompt;
pub use provider::{AiProvider, Generation, ProviderRegistry, TokenUsage};
pub use validate::{analyze_tone_score, validate_review, Validated, ValidationError};
