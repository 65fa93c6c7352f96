//! The generation pass: prompt, provider, gates, persistence
//!
//! One pass never retries. A failure is reported to the caller, who hands it
//! to the retry scheduler.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::Result;
use crate::media::MediaEnricher;
use crate::models::{DraftStatus, Product, ReviewDraft, ReviewOutcome};
use crate::review::prompt::build_review_prompt;
use crate::review::provider::ProviderRegistry;
use crate::review::validate::validate_review;
use crate::store::DraftStore;

/// Generates, validates and persists review drafts
pub struct ReviewPipeline {
    drafts: Arc<dyn DraftStore>,
    registry: ProviderRegistry,
    enricher: Arc<dyn MediaEnricher>,
}

impl ReviewPipeline {
    pub fn new(
        drafts: Arc<dyn DraftStore>,
        registry: ProviderRegistry,
        enricher: Arc<dyn MediaEnricher>,
    ) -> Self {
        Self {
            drafts,
            registry,
            enricher,
        }
    }

    /// Run one generation pass for a product.
    ///
    /// Earlier drafts for the product are deleted only after the new text
    /// passes every gate, so a failed regeneration never destroys the last
    /// good draft.
    pub async fn generate(&self, product: &Product, settings: &Settings) -> Result<ReviewOutcome> {
        let provider = self.registry.get(&settings.ai.provider)?;
        let user_prompt = build_review_prompt(product, &settings.prompt);

        let generation = provider
            .generate(&settings.prompt.system_prompt, &user_prompt, &settings.ai)
            .await?;

        let validated = validate_review(&generation.text, &settings.prompt)?;

        // Best effort: a draft without media is still a draft
        let media = match self.enricher.enrich(product).await {
            Ok(media) => media,
            Err(e) => {
                warn!(product_id = %product.product_id, error = %e, "Media enrichment failed");
                Vec::new()
            }
        };

        let replaced = self.drafts.delete_for_product(&product.product_id).await?;
        if replaced > 0 {
            info!(product_id = %product.product_id, replaced, "Replaced earlier drafts");
        }

        let now = Utc::now();
        let draft = ReviewDraft {
            id: Uuid::new_v4().to_string(),
            product_id: product.product_id.clone(),
            content: generation.text,
            status: DraftStatus::Draft,
            tone_score: validated.tone_score,
            char_count: validated.char_count,
            media,
            created_at: now,
            updated_at: now,
        };
        let draft_id = self.drafts.add(draft).await?;

        info!(
            product_id = %product.product_id,
            draft_id = %draft_id,
            tone_score = validated.tone_score,
            char_count = validated.char_count,
            provider = %generation.provider,
            usage = ?generation.usage,
            "Review draft persisted"
        );

        Ok(ReviewOutcome {
            draft_id,
            tone_score: validated.tone_score,
            char_count: validated.char_count,
            provider: generation.provider,
            model: generation.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::media::ProductImageEnricher;
    use crate::models::ProductStatus;
    use crate::review::provider::OpenAiProvider;
    use crate::review::validate::ValidationError;
    use crate::store::MemoryDraftStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GOOD_REVIEW: &str = "배송이 빨라서 원하는 날에 바로 도착했고 품질도 만족스러워 인테리어에 잘 어울려요 \
                               마감이 깔끔하고 재질도 튼튼해서 오래 쓸 수 있을 것 같아 주변에 추천하고 싶은 괜찮은 제품입니다";

    fn product() -> Product {
        Product {
            product_id: "7654321".to_string(),
            product_name: "무선 가습기".to_string(),
            product_price: 32900,
            product_image: "https://img/7654321.jpg".to_string(),
            product_url: "https://x/7654321".to_string(),
            category_id: Some("1016".to_string()),
            category_name: Some("가전".to_string()),
            affiliate_url: "https://link/7654321".to_string(),
            source: "goldbox".to_string(),
            status: ProductStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.ai.api_key = "test-key".to_string();
        settings
    }

    async fn pipeline_against(server: &MockServer) -> (ReviewPipeline, Arc<MemoryDraftStore>) {
        let drafts = Arc::new(MemoryDraftStore::new());
        let mut registry = ProviderRegistry::new(Duration::from_secs(5)).unwrap();
        registry.register(Arc::new(
            OpenAiProvider::new(Duration::from_secs(5))
                .unwrap()
                .with_base_url(server.uri()),
        ));

        let pipeline = ReviewPipeline::new(
            drafts.clone(),
            registry,
            Arc::new(ProductImageEnricher),
        );
        (pipeline, drafts)
    }

    async fn mount_completion(server: &MockServer, text: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": text}}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_generation_persists_draft() {
        let server = MockServer::start().await;
        mount_completion(&server, GOOD_REVIEW).await;

        let (pipeline, drafts) = pipeline_against(&server).await;
        let outcome = pipeline.generate(&product(), &settings()).await.unwrap();

        assert_eq!(outcome.provider, "openai");
        assert!(outcome.tone_score > 0.4);

        let stored = drafts.get(&outcome.draft_id).await.unwrap();
        assert_eq!(stored.product_id, "7654321");
        assert_eq!(stored.status, DraftStatus::Draft);
        assert_eq!(stored.media.len(), 1);
    }

    #[tokio::test]
    async fn test_regeneration_replaces_earlier_drafts() {
        let server = MockServer::start().await;
        mount_completion(&server, GOOD_REVIEW).await;

        let (pipeline, drafts) = pipeline_against(&server).await;

        let first = pipeline.generate(&product(), &settings()).await.unwrap();
        let second = pipeline.generate(&product(), &settings()).await.unwrap();

        assert_ne!(first.draft_id, second.draft_id);
        assert_eq!(drafts.len().await, 1);
        assert!(drafts.get(&first.draft_id).await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_draft_keeps_last_good_one() {
        let server = MockServer::start().await;
        mount_completion(&server, GOOD_REVIEW).await;

        let (pipeline, drafts) = pipeline_against(&server).await;
        let good = pipeline.generate(&product(), &settings()).await.unwrap();

        // Next completion is too short to pass the length gate
        server.reset().await;
        mount_completion(&server, "짧은 후기").await;

        let result = pipeline.generate(&product(), &settings()).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::LengthOutOfRange { .. }))
        ));

        // Earlier draft survives a failed regeneration
        assert!(drafts.get(&good.draft_id).await.is_some());
        assert_eq!(drafts.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let server = MockServer::start().await;
        let (pipeline, _) = pipeline_against(&server).await;

        let mut settings = settings();
        settings.ai.provider = "cohere".to_string();

        assert!(matches!(
            pipeline.generate(&product(), &settings).await,
            Err(Error::Config(_))
        ));
    }
}
