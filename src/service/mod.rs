//! Automation service: the orchestrating surface over all collaborators
//!
//! [`AutomationService`] owns the collection orchestrator, review pipeline and
//! retry scheduler, reads runtime settings through a TTL cache, and drives the
//! scheduled loop (collection, review pass, retry sweeps, weekly cleanup).
//! Stale settings reads within the TTL window are acceptable; a settings edit
//! takes effect within one cache refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

use crate::collector::CollectionOrchestrator;
use crate::config::{Config, Settings};
use crate::error::{Error, Result};
use crate::media::MediaEnricher;
use crate::models::{CollectOutcome, Product, ProductStatus, ReviewOutcome};
use crate::notify::{Notification, NotificationSink, NotifyLevel};
use crate::retry::{RetryDecision, RetryScheduler};
use crate::review::{ProviderRegistry, ReviewPipeline};
use crate::schedule::{ScheduleEvent, ScheduleSync};
use crate::store::{DraftStore, ItemStore, RetryStore, SettingsSource};
use crate::vendor::client::SignedApiClient;

/// TTL cache in front of the external settings source
pub struct SettingsCache {
    source: Arc<dyn SettingsSource>,
    ttl: Duration,
    cached: RwLock<Option<(Settings, Instant)>>,
}

impl SettingsCache {
    pub fn new(source: Arc<dyn SettingsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current settings snapshot, refreshed from the source when expired
    pub async fn get(&self) -> Result<Settings> {
        {
            let cached = self.cached.read().await;
            if let Some((settings, fetched_at)) = cached.as_ref() {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(settings.clone());
                }
            }
        }

        let fresh = self.source.get().await?;
        *self.cached.write().await = Some((fresh.clone(), Instant::now()));
        Ok(fresh)
    }

    /// Drop the cached snapshot so the next read hits the source
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

/// Top-level pipeline service
pub struct AutomationService {
    config: Config,
    settings: SettingsCache,
    items: Arc<dyn ItemStore>,
    retries: Arc<dyn RetryStore>,
    notifier: Arc<dyn NotificationSink>,
    collector: CollectionOrchestrator,
    pipeline: ReviewPipeline,
    scheduler: RetryScheduler,
}

impl AutomationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        source: Arc<dyn SettingsSource>,
        items: Arc<dyn ItemStore>,
        drafts: Arc<dyn DraftStore>,
        retries: Arc<dyn RetryStore>,
        notifier: Arc<dyn NotificationSink>,
        enricher: Arc<dyn MediaEnricher>,
        registry: ProviderRegistry,
    ) -> Result<Self> {
        let settings = SettingsCache::new(source, config.settings_ttl());

        Ok(Self {
            collector: CollectionOrchestrator::new(items.clone()),
            pipeline: ReviewPipeline::new(drafts, registry, enricher),
            scheduler: RetryScheduler::new(retries.clone(), items.clone(), notifier.clone()),
            config,
            settings,
            items,
            retries,
            notifier,
        })
    }

    /// The settings cache, for callers that need a raw snapshot
    pub fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Scheduled collection entry point, gated on the automation toggle.
    ///
    /// Disabled automation is a quiet no-op, not an error: the timer keeps
    /// firing and collection resumes as soon as the admin re-enables it.
    pub async fn collect_auto(&self) -> Result<CollectOutcome> {
        let settings = self.settings.get().await?;

        if !settings.automation.enabled {
            info!("Automation disabled, skipping scheduled collection");
            return Ok(CollectOutcome::empty());
        }

        self.collect(&settings, settings.automation.max_products_per_run)
            .await
    }

    /// Timer entry point; identical to [`Self::collect_auto`]
    pub async fn run_scheduled_collection(&self) -> Result<CollectOutcome> {
        self.collect_auto().await
    }

    /// Manual collection with an explicit budget; ignores the automation gate
    pub async fn collect_manual(&self, max_products: usize) -> Result<CollectOutcome> {
        let settings = self.settings.get().await?;
        self.collect(&settings, max_products).await
    }

    async fn collect(&self, settings: &Settings, budget: usize) -> Result<CollectOutcome> {
        let client = self.vendor_client(settings)?;
        let outcome = self.collector.run(&client, settings, budget).await?;

        if outcome.collected > 0 {
            self.notifier
                .notify(
                    Notification::new(
                        NotifyLevel::Info,
                        "상품 수집 완료",
                        format!("{}개 상품을 수집했습니다", outcome.collected),
                    )
                    .with_field("goldbox", outcome.stats.goldbox.to_string())
                    .with_field("categories", outcome.stats.categories.to_string())
                    .with_field("keywords", outcome.stats.keywords.to_string())
                    .with_field("brands", outcome.stats.brands.to_string()),
                )
                .await;
        }

        Ok(outcome)
    }

    // ========================================================================
    // Review generation
    // ========================================================================

    /// Generate a review draft for one product.
    ///
    /// A retryable failure is handed to the retry scheduler before the error
    /// is returned, so the caller sees the failure and the retry machinery
    /// still engages.
    pub async fn generate_review(&self, product_id: &str) -> Result<ReviewOutcome> {
        let settings = self.settings.get().await?;
        let product = self
            .items
            .get(product_id)
            .await?
            .ok_or_else(|| Error::storage(format!("product {product_id} not found")))?;

        match self.pipeline.generate(&product, &settings).await {
            Ok(outcome) => {
                self.items
                    .set_status(product_id, ProductStatus::Completed)
                    .await?;
                Ok(outcome)
            }
            Err(e) if e.is_retryable() => {
                warn!(product_id, error = %e, "Review generation failed, scheduling retry");
                let decision = self
                    .scheduler
                    .on_failure(product_id, 0, &e.to_string(), &settings.retry)
                    .await?;
                self.items
                    .set_status(product_id, ProductStatus::Failed)
                    .await?;
                match decision {
                    RetryDecision::Exhausted { attempts } => Err(Error::RetryExhausted {
                        product_id: product_id.to_string(),
                        attempts,
                    }),
                    RetryDecision::Scheduled { .. } => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Review pass over pending products, at most one generation per product.
    ///
    /// Failures are contained per product; the pass continues.
    pub async fn review_pending(&self) -> Result<usize> {
        let settings = self.settings.get().await?;
        let pending = self
            .items
            .list_by_status(ProductStatus::Pending, settings.automation.max_products_per_run)
            .await?;

        let mut generated = 0;
        for product in &pending {
            match self.generate_review(&product.product_id).await {
                Ok(_) => generated += 1,
                Err(e) => {
                    warn!(product_id = %product.product_id, error = %e, "Review pass item failed");
                }
            }
        }

        info!(generated, attempted = pending.len(), "Review pass finished");
        Ok(generated)
    }

    // ========================================================================
    // Retry sweep and cleanup
    // ========================================================================

    /// Process due retry jobs by regenerating their reviews
    pub async fn sweep_retries(&self) -> Result<()> {
        let settings = self.settings.get().await?;
        self.scheduler
            .sweep(&settings.retry, |product: Product| async move {
                let settings = self.settings.get().await?;
                self.pipeline.generate(&product, &settings).await?;
                self.items
                    .set_status(&product.product_id, ProductStatus::Completed)
                    .await?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Weekly maintenance: drop retry jobs whose product no longer exists
    pub async fn cleanup(&self) -> Result<usize> {
        let horizon = chrono::Utc::now() + chrono::Duration::days(36500);
        let jobs = self.retries.due_jobs(horizon, usize::MAX).await?;

        let mut pruned = 0;
        for job in jobs {
            if self.items.get(&job.product_id).await?.is_none() {
                self.retries.delete(&job.product_id).await?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            info!(pruned, "Cleanup pruned orphaned retry jobs");
        }
        Ok(pruned)
    }

    // ========================================================================
    // Scheduled loop
    // ========================================================================

    /// Run the scheduled loop until `shutdown` flips.
    ///
    /// The loop re-reads the schedule from settings once a minute (so a
    /// schedule edit takes effect within a TTL plus a minute) and runs retry
    /// sweeps on the configured interval.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::channel::<ScheduleEvent>(16);
        let mut sync = ScheduleSync::new(events_tx, shutdown.clone());
        sync.arm_cleanup()?;

        let settings = self.settings.get().await?;
        sync.tick(&settings.automation)?;

        let mut sync_interval = tokio::time::interval(Duration::from_secs(60));
        sync_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let sweep_minutes = settings.retry.sweep_interval_minutes.max(1);
        let mut sweep_interval =
            tokio::time::interval(Duration::from_secs(sweep_minutes * 60));
        sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut shutdown = shutdown;
        info!("Automation service loop started");

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => {
                    self.handle_event(event).await;
                }
                _ = sync_interval.tick() => {
                    match self.settings.get().await {
                        Ok(settings) => {
                            if let Err(e) = sync.tick(&settings.automation) {
                                error!(error = %e, "Schedule sync failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "Settings refresh failed"),
                    }
                }
                _ = sweep_interval.tick() => {
                    if let Err(e) = self.sweep_retries().await {
                        error!(error = %e, "Retry sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, stopping service loop");
                    break;
                }
            }
        }

        sync.stop();
        Ok(())
    }

    async fn handle_event(&self, event: ScheduleEvent) {
        match event {
            ScheduleEvent::CollectDue => {
                if let Err(e) = self.run_scheduled_collection().await {
                    error!(error = %e, "Scheduled collection failed");
                }
            }
            ScheduleEvent::ReviewDue => {
                if let Err(e) = self.review_pending().await {
                    error!(error = %e, "Scheduled review pass failed");
                }
            }
            ScheduleEvent::CleanupDue => {
                if let Err(e) = self.cleanup().await {
                    error!(error = %e, "Weekly cleanup failed");
                }
            }
        }
    }

    /// Build a signed vendor client from the current settings snapshot.
    ///
    /// Built per run rather than held, so rotated credentials apply on the
    /// next collection.
    fn vendor_client(&self, settings: &Settings) -> Result<SignedApiClient> {
        let mut client = SignedApiClient::new(
            settings.vendor.access_key.clone(),
            settings.vendor.secret_key.clone(),
            settings.vendor.sub_id.clone(),
            self.config.request_timeout(),
        )?;

        if let Some(base_url) = &self.config.vendor_base_url {
            client = client.with_base_url(base_url.clone());
        }

        Ok(client)
    }
}
