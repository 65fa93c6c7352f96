//! Product collection orchestration
//!
//! A collection run walks the discovery channels in a fixed order (goldbox,
//! category-best, keyword-search, brand-catalog), each capped by the
//! [`QuotaAllocator`]. Every fetched batch is rewritten into affiliate links
//! with a single batched deeplink call and inserted with duplicate keys
//! skipped, so re-running collection never multiplies records.
//!
//! Failure containment is per sub-source: a keyword or category that errors
//! is logged and skipped, and the run carries on with the remaining sources.
//! Statistics are always complete; a failed channel contributes zero.

pub mod quota;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{ChannelStats, CollectOutcome, Product, ProductStatus};
use crate::store::ItemStore;
use crate::vendor::client::{SignedApiClient, VendorOutcome, VendorProduct};

pub use quota::{Channel, QuotaAllocator};

/// Runs collection across all discovery channels
pub struct CollectionOrchestrator {
    items: Arc<dyn ItemStore>,
    allocator: QuotaAllocator,
    // At most one run at a time; a second trigger is a logged no-op
    run_guard: Mutex<()>,
}

impl CollectionOrchestrator {
    pub fn new(items: Arc<dyn ItemStore>) -> Self {
        Self {
            items,
            allocator: QuotaAllocator::default(),
            run_guard: Mutex::new(()),
        }
    }

    /// Execute one collection run with the given item budget.
    ///
    /// Returns an empty outcome without touching any channel when a run is
    /// already in flight. Fails before any vendor call when the credentials
    /// are missing or the vendor integration is switched off.
    pub async fn run(
        &self,
        client: &SignedApiClient,
        settings: &Settings,
        budget: usize,
    ) -> Result<CollectOutcome> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("Collection run already in progress, skipping trigger");
            return Ok(CollectOutcome::empty());
        };

        if !settings.vendor.enabled {
            return Err(Error::config("vendor integration is disabled"));
        }
        if !settings.vendor.is_configured() {
            return Err(Error::config("vendor API credentials are not configured"));
        }
        if budget == 0 {
            return Ok(CollectOutcome::empty());
        }

        info!(budget, "Starting collection run");
        let mut stats = ChannelStats::default();

        for channel in Channel::RUN_ORDER {
            let cap = self.allocator.cap(channel, budget, stats.total());
            if cap == 0 {
                debug!(channel = channel.as_str(), "Channel budget exhausted, skipping");
                continue;
            }

            let saved = match channel {
                Channel::Goldbox => self.collect_goldbox(client, settings, cap).await,
                Channel::CategoryBest => self.collect_categories(client, settings, cap).await,
                Channel::KeywordSearch => self.collect_keywords(client, settings, cap).await,
                Channel::BrandCatalog => self.collect_brands(client, settings, cap).await,
            };

            match channel {
                Channel::Goldbox => stats.goldbox = saved,
                Channel::CategoryBest => stats.categories = saved,
                Channel::KeywordSearch => stats.keywords = saved,
                Channel::BrandCatalog => stats.brands = saved,
            }
        }

        let collected = stats.total();
        info!(
            collected,
            goldbox = stats.goldbox,
            categories = stats.categories,
            keywords = stats.keywords,
            brands = stats.brands,
            "Collection run finished"
        );

        Ok(CollectOutcome { collected, stats })
    }

    // ========================================================================
    // Channels
    // ========================================================================

    async fn collect_goldbox(
        &self,
        client: &SignedApiClient,
        settings: &Settings,
        cap: usize,
    ) -> usize {
        if !settings.topics.goldbox_enabled {
            return 0;
        }

        let products = match client.goldbox_products().await {
            Ok(VendorOutcome::Success(products)) => products,
            Ok(VendorOutcome::Failure { message }) => {
                warn!(message = %message, "Goldbox fetch reported failure");
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "Goldbox fetch failed");
                return 0;
            }
        };

        self.save_batch(client, products, "goldbox", None, cap).await
    }

    async fn collect_categories(
        &self,
        client: &SignedApiClient,
        settings: &Settings,
        cap: usize,
    ) -> usize {
        let categories = settings.enabled_categories();
        if categories.is_empty() {
            return 0;
        }

        let per_category = QuotaAllocator::per_source_quota(cap, categories.len());
        let mut saved = 0;

        for category in categories {
            if saved >= cap {
                break;
            }

            let products = match client.best_category_products(&category.id, per_category).await {
                Ok(VendorOutcome::Success(products)) => products,
                Ok(VendorOutcome::Failure { message }) => {
                    warn!(category = %category.id, message = %message, "Category fetch reported failure");
                    continue;
                }
                Err(e) => {
                    warn!(category = %category.id, error = %e, "Category fetch failed");
                    continue;
                }
            };

            let source = format!("category:{}", category.id);
            saved += self
                .save_batch(
                    client,
                    products,
                    &source,
                    Some((&category.id, &category.name)),
                    cap - saved,
                )
                .await;
        }

        saved
    }

    async fn collect_keywords(
        &self,
        client: &SignedApiClient,
        settings: &Settings,
        cap: usize,
    ) -> usize {
        let keywords = &settings.topics.keywords;
        if keywords.is_empty() {
            return 0;
        }

        let per_keyword = QuotaAllocator::per_source_quota(cap, keywords.len());
        let mut saved = 0;

        for keyword in keywords {
            if saved >= cap {
                break;
            }

            let products = match client.search_products(keyword, per_keyword).await {
                Ok(VendorOutcome::Success(products)) => products,
                Ok(VendorOutcome::Failure { message }) => {
                    warn!(keyword = %keyword, message = %message, "Keyword search reported failure");
                    continue;
                }
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "Keyword search failed");
                    continue;
                }
            };

            let source = format!("keyword:{keyword}");
            saved += self
                .save_batch(client, products, &source, None, cap - saved)
                .await;
        }

        saved
    }

    async fn collect_brands(
        &self,
        client: &SignedApiClient,
        settings: &Settings,
        cap: usize,
    ) -> usize {
        let brand_ids = &settings.topics.brand_ids;
        if brand_ids.is_empty() {
            return 0;
        }

        let per_brand = QuotaAllocator::per_source_quota(cap, brand_ids.len());
        let mut saved = 0;

        for brand_id in brand_ids {
            if saved >= cap {
                break;
            }

            let products = match client.brand_products(brand_id, per_brand).await {
                Ok(VendorOutcome::Success(products)) => products,
                Ok(VendorOutcome::Failure { message }) => {
                    warn!(brand = %brand_id, message = %message, "Brand fetch reported failure");
                    continue;
                }
                Err(e) => {
                    warn!(brand = %brand_id, error = %e, "Brand fetch failed");
                    continue;
                }
            };

            let source = format!("brand:{brand_id}");
            saved += self
                .save_batch(client, products, &source, None, cap - saved)
                .await;
        }

        saved
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Rewrite a fetched batch into affiliate links and insert it, returning
    /// how many products were newly saved.
    ///
    /// One deeplink call covers the whole batch. When the rewrite fails or
    /// returns no link for a URL, the original product URL is kept so the
    /// record stays usable.
    async fn save_batch(
        &self,
        client: &SignedApiClient,
        mut products: Vec<VendorProduct>,
        source: &str,
        category: Option<(&str, &str)>,
        room: usize,
    ) -> usize {
        products.truncate(room);
        if products.is_empty() {
            return 0;
        }

        let urls: Vec<String> = products.iter().map(|p| p.product_url.clone()).collect();
        let links = match client.create_deeplinks(&urls).await {
            Ok(VendorOutcome::Success(links)) => links,
            Ok(VendorOutcome::Failure { message }) => {
                warn!(source, message = %message, "Deeplink rewrite reported failure, keeping original URLs");
                Vec::new()
            }
            Err(e) => {
                warn!(source, error = %e, "Deeplink rewrite failed, keeping original URLs");
                Vec::new()
            }
        };

        let mut link_map: HashMap<String, String> = HashMap::new();
        for (index, link) in links.iter().enumerate() {
            let Some(shorten) = &link.shorten_url else {
                continue;
            };
            let original = link
                .original_url
                .clone()
                .or_else(|| urls.get(index).cloned());
            if let Some(original) = original {
                link_map.insert(original, shorten.clone());
            }
        }

        let mut saved = 0;
        for vendor_product in products {
            let affiliate_url = link_map
                .get(&vendor_product.product_url)
                .cloned()
                .unwrap_or_else(|| vendor_product.product_url.clone());

            let product = Product {
                product_id: vendor_product.product_id,
                product_name: vendor_product.product_name,
                product_price: vendor_product.product_price,
                product_image: vendor_product.product_image,
                product_url: vendor_product.product_url,
                category_id: category.map(|(id, _)| id.to_string()),
                category_name: category
                    .map(|(_, name)| name.to_string())
                    .or(vendor_product.category_name),
                affiliate_url,
                source: source.to_string(),
                status: ProductStatus::Pending,
                created_at: Utc::now(),
            };

            match self.items.put(product).await {
                Ok(true) => saved += 1,
                Ok(false) => {
                    debug!(source, "Skipping already-collected product");
                }
                Err(e) => {
                    warn!(source, error = %e, "Failed to save product");
                }
            }
        }

        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryTopic;
    use crate::store::MemoryItemStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PREFIX: &str = "/v2/providers/affiliate_open_api/apis/openapi";

    fn client(base: &str) -> SignedApiClient {
        SignedApiClient::new("ak", "sk", "blog", Duration::from_secs(5))
            .unwrap()
            .with_base_url(base)
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.vendor.enabled = true;
        settings.vendor.access_key = "ak".to_string();
        settings.vendor.secret_key = "sk".to_string();
        settings.topics.goldbox_enabled = false;
        settings
    }

    fn vendor_products(ids: &[&str]) -> serde_json::Value {
        let items: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "productId": id,
                    "productName": format!("상품 {id}"),
                    "productPrice": 19900,
                    "productUrl": format!("https://x/{id}")
                })
            })
            .collect();
        serde_json::json!(items)
    }

    fn envelope(data: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"rCode": 0, "rMessage": "", "data": data})
    }

    async fn mount_empty_deeplink(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{PREFIX}/v1/deeplink")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!([]))),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_missing_credentials_abort_before_any_call() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = CollectionOrchestrator::new(store);

        let mut settings = settings();
        settings.vendor.secret_key = String::new();

        let result = orchestrator.run(&client(&server.uri()), &settings, 10).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_quota_split_and_cap() {
        let server = MockServer::start().await;
        mount_empty_deeplink(&server).await;

        // Keyword channel budget for a 17-item run is floor(17 * 0.3) = 5,
        // split ceil(5 / 2) = 3 per keyword; the second keyword gets capped
        // to the 2 remaining slots.
        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/search")))
            .and(query_param("keyword", "원두"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(serde_json::json!({
                        "productData": vendor_products(&["a1", "a2", "a3"])
                    }))),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/search")))
            .and(query_param("keyword", "텀블러"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(serde_json::json!({
                        "productData": vendor_products(&["b1", "b2", "b3"])
                    }))),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = CollectionOrchestrator::new(store.clone());

        let mut settings = settings();
        settings.topics.keywords = vec!["원두".to_string(), "텀블러".to_string()];

        let outcome = orchestrator
            .run(&client(&server.uri()), &settings, 17)
            .await
            .unwrap();

        assert_eq!(outcome.stats.keywords, 5);
        assert_eq!(outcome.collected, 5);
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn test_failing_category_does_not_stop_others() {
        let server = MockServer::start().await;
        mount_empty_deeplink(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/bestcategories/1016")))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/bestcategories/1025")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(vendor_products(&["c1", "c2"]))),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = CollectionOrchestrator::new(store.clone());

        let mut settings = settings();
        settings.topics.categories = vec![
            CategoryTopic {
                id: "1016".to_string(),
                name: "가전".to_string(),
                enabled: true,
            },
            CategoryTopic {
                id: "1025".to_string(),
                name: "식품".to_string(),
                enabled: true,
            },
        ];

        let outcome = orchestrator
            .run(&client(&server.uri()), &settings, 10)
            .await
            .unwrap();

        assert_eq!(outcome.stats.categories, 2);
        let saved = store.get("c1").await.unwrap().unwrap();
        assert_eq!(saved.category_name.as_deref(), Some("식품"));
        assert_eq!(saved.source, "category:1025");
    }

    #[tokio::test]
    async fn test_duplicate_product_across_channels_saved_once() {
        let server = MockServer::start().await;
        mount_empty_deeplink(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/goldbox")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(vendor_products(&["dup"]))),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/search")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(serde_json::json!({
                        "productData": vendor_products(&["dup"])
                    }))),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = CollectionOrchestrator::new(store.clone());

        let mut settings = settings();
        settings.topics.goldbox_enabled = true;
        settings.topics.keywords = vec!["가습기".to_string()];

        let outcome = orchestrator
            .run(&client(&server.uri()), &settings, 10)
            .await
            .unwrap();

        // Same natural key arrived through two channels: one record
        assert_eq!(outcome.collected, 1);
        assert_eq!(outcome.stats.goldbox, 1);
        assert_eq!(outcome.stats.keywords, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_deeplink_rewrite_with_fallback() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"/products/goldbox$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(vendor_products(&["g1", "g2"]))),
            )
            .mount(&server)
            .await;

        // Only the first URL gets a rewritten link
        Mock::given(method("POST"))
            .and(path(format!("{PREFIX}/v1/deeplink")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!([
                    {"originalUrl": "https://x/g1", "shortenUrl": "https://link/g1"}
                ]))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = CollectionOrchestrator::new(store.clone());

        let mut settings = settings();
        settings.topics.goldbox_enabled = true;

        let outcome = orchestrator
            .run(&client(&server.uri()), &settings, 10)
            .await
            .unwrap();
        assert_eq!(outcome.stats.goldbox, 2);

        let rewritten = store.get("g1").await.unwrap().unwrap();
        assert_eq!(rewritten.affiliate_url, "https://link/g1");

        let fallback = store.get("g2").await.unwrap().unwrap();
        assert_eq!(fallback.affiliate_url, "https://x/g2");
    }

    #[tokio::test]
    async fn test_second_trigger_during_run_is_a_noop() {
        let server = MockServer::start().await;
        mount_empty_deeplink(&server).await;

        // Slow goldbox response keeps the first run in flight
        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/products/goldbox")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(envelope(vendor_products(&["g1"]))),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryItemStore::new());
        let orchestrator = Arc::new(CollectionOrchestrator::new(store));

        let mut settings = settings();
        settings.topics.goldbox_enabled = true;

        let first = {
            let orchestrator = orchestrator.clone();
            let client = client(&server.uri());
            let settings = settings.clone();
            tokio::spawn(async move { orchestrator.run(&client, &settings, 10).await })
        };

        // Wait until the first run holds the guard and is mid-fetch
        while server.received_requests().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = orchestrator
            .run(&client(&server.uri()), &settings, 10)
            .await
            .unwrap();
        assert_eq!(second.collected, 0);
        // The overlapping trigger issued no vendor calls of its own
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.collected, 1);
    }

    #[tokio::test]
    async fn test_zero_budget_is_a_noop() {
        let server = MockServer::start().await;
        let orchestrator = CollectionOrchestrator::new(Arc::new(MemoryItemStore::new()));

        let outcome = orchestrator
            .run(&client(&server.uri()), &settings(), 0)
            .await
            .unwrap();

        assert_eq!(outcome.collected, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
