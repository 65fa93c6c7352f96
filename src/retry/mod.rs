//! Exponential-backoff retry scheduling for failed review generations
//!
//! Each product has at most one retry job, keyed by product id. A failure
//! advances the attempt counter monotonically (`max(stored, reported) + 1`)
//! and schedules the next attempt at `base * 2^(attempt - 1)` minutes out.
//! Jobs that reach the attempt ceiling are deleted and announced as terminal.
//!
//! The periodic sweep claims each due job through a versioned conditional
//! update, so overlapping sweepers agree on a single winner per job and a
//! product is never generated twice in one pass.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RetrySettings;
use crate::error::Result;
use crate::models::{Product, RetryJob, RetryStatus};
use crate::notify::{Notification, NotificationSink, NotifyLevel};
use crate::store::{ItemStore, RetryStore};

/// What the scheduler decided about a reported failure
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Another attempt is scheduled
    Scheduled {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt ceiling was reached; the job is gone
    Exhausted { attempts: u32 },
}

/// Counters for one sweep pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepStats {
    pub processed: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
    pub orphans: usize,
}

/// Retry state machine and sweep driver
pub struct RetryScheduler {
    retries: Arc<dyn RetryStore>,
    items: Arc<dyn ItemStore>,
    notifier: Arc<dyn NotificationSink>,
    // Sweeps must not overlap; a second trigger is a logged no-op
    sweep_guard: Mutex<()>,
}

impl RetryScheduler {
    pub fn new(
        retries: Arc<dyn RetryStore>,
        items: Arc<dyn ItemStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            retries,
            items,
            notifier,
            sweep_guard: Mutex::new(()),
        }
    }

    /// Record a generation failure and decide the next step.
    ///
    /// `attempt` is the attempt count the caller observed; the stored counter
    /// wins when it is ahead, so a stale caller can never rewind the state
    /// machine.
    pub async fn on_failure(
        &self,
        product_id: &str,
        attempt: u32,
        reason: &str,
        settings: &RetrySettings,
    ) -> Result<RetryDecision> {
        let stored = self
            .retries
            .get(product_id)
            .await?
            .map(|job| job.attempt)
            .unwrap_or(0);
        let next = stored.max(attempt) + 1;

        if next >= settings.max_attempts {
            self.retries.delete(product_id).await?;
            self.items
                .set_status(product_id, crate::models::ProductStatus::Failed)
                .await?;
            warn!(product_id, attempts = next, "Retry attempts exhausted");

            self.notifier
                .notify(
                    Notification::new(
                        NotifyLevel::Error,
                        "리뷰 생성 재시도 중단",
                        format!("상품 {product_id} 리뷰 생성이 {next}회 실패하여 중단되었습니다"),
                    )
                    .with_field("product_id", product_id)
                    .with_field("reason", reason),
                )
                .await;

            return Ok(RetryDecision::Exhausted { attempts: next });
        }

        let delay_minutes = settings.base_delay_minutes * 2u64.pow(next - 1);
        let next_attempt_at = Utc::now() + Duration::minutes(delay_minutes as i64);

        self.retries
            .upsert(RetryJob {
                product_id: product_id.to_string(),
                attempt: next,
                next_attempt_at,
                reason: reason.to_string(),
                status: RetryStatus::RetryPending,
                version: 0, // assigned by the store
                updated_at: Utc::now(),
            })
            .await?;

        info!(
            product_id,
            attempt = next,
            delay_minutes,
            "Scheduled retry"
        );

        Ok(RetryDecision::Scheduled {
            attempt: next,
            next_attempt_at,
        })
    }

    /// Process due retry jobs, invoking `handler` once per claimed job.
    ///
    /// Jobs whose product no longer exists are dropped as orphans. A handler
    /// failure re-enters the state machine with the job's attempt count.
    pub async fn sweep<F, Fut>(&self, settings: &RetrySettings, handler: F) -> Result<SweepStats>
    where
        F: Fn(Product) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            warn!("Retry sweep already in progress, skipping trigger");
            return Ok(SweepStats::default());
        };

        let due = self
            .retries
            .due_jobs(Utc::now(), settings.sweep_batch_size)
            .await?;
        let mut stats = SweepStats::default();

        for job in due {
            if !self.retries.claim(&job.product_id, job.version).await? {
                // Another sweeper won this job
                continue;
            }
            stats.processed += 1;

            let Some(product) = self.items.get(&job.product_id).await? else {
                warn!(product_id = %job.product_id, "Dropping retry job for missing product");
                self.retries.delete(&job.product_id).await?;
                stats.orphans += 1;
                continue;
            };

            match handler(product).await {
                Ok(()) => {
                    self.retries.delete(&job.product_id).await?;
                    stats.succeeded += 1;
                }
                Err(e) => {
                    let decision = self
                        .on_failure(&job.product_id, job.attempt, &e.to_string(), settings)
                        .await?;
                    match decision {
                        RetryDecision::Scheduled { .. } => stats.rescheduled += 1,
                        RetryDecision::Exhausted { .. } => stats.exhausted += 1,
                    }
                }
            }
        }

        if stats.processed > 0 {
            info!(
                processed = stats.processed,
                succeeded = stats.succeeded,
                rescheduled = stats.rescheduled,
                exhausted = stats.exhausted,
                orphans = stats.orphans,
                "Retry sweep finished"
            );
        }

        Ok(stats)
    }
}
