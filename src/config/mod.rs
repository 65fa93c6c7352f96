//! Configuration management for the haul pipeline
//!
//! Two layers of configuration exist: the process-level [`Config`] loaded once
//! at startup (logging, HTTP timeouts), and the runtime [`Settings`] snapshot
//! served by a [`crate::store::SettingsSource`] and cached with a short TTL.
//! Settings are read-mostly shared state; stale reads within the TTL window
//! are acceptable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Process-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Settings cache TTL in seconds
    pub settings_ttl_secs: u64,

    /// Vendor gateway override; `None` uses the production gateway
    pub vendor_base_url: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let request_timeout_secs = std::env::var("HAUL_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let settings_ttl_secs = std::env::var("HAUL_SETTINGS_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        let vendor_base_url = std::env::var("HAUL_VENDOR_BASE_URL").ok();

        let level = std::env::var("HAUL_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let format = std::env::var("HAUL_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            request_timeout_secs,
            settings_ttl_secs,
            vendor_base_url,
            logging: LoggingConfig { level, format },
        })
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get settings TTL as Duration
    #[must_use]
    pub fn settings_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            settings_ttl_secs: 300,
            vendor_base_url: None,
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

// ============================================================================
// Runtime settings snapshot
// ============================================================================

/// Runtime settings served by the external settings source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub vendor: VendorSettings,
    pub ai: AiSettings,
    pub prompt: PromptSettings,
    pub topics: TopicSettings,
    pub automation: AutomationSettings,
    pub retry: RetrySettings,
    pub notify: NotifySettings,
}

/// Affiliate API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VendorSettings {
    pub enabled: bool,
    pub access_key: String,
    pub secret_key: String,
    /// Tracking sub-id appended to deeplink requests
    pub sub_id: String,
}

impl VendorSettings {
    /// Check the credentials precondition for a collection run
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// AI provider selection and generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// Registry key of the active provider: `openai`, `anthropic`, `google`
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Prompt template and content-quality gates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub system_prompt: String,
    /// Review template with `{productName}`, `{category}`, `{minLength}`,
    /// `{maxLength}` placeholders
    pub review_template: String,
    pub min_length: usize,
    pub max_length: usize,
    /// Drafts scoring at or below this are rejected before persistence
    pub tone_score_threshold: f64,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system_prompt: "당신은 전문적인 상품 리뷰 작성자입니다.".to_string(),
            review_template: "{productName} ({category}) 상품에 대한 후기를 생생하게 작성해주세요. \
                              {minLength}~{maxLength}자 분량으로, 실제 사용 경험처럼 묘사하고 \
                              광고성 문구는 삼가주세요."
                .to_string(),
            min_length: 90,
            max_length: 170,
            tone_score_threshold: 0.4,
        }
    }
}

/// Discovery channel sub-sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub goldbox_enabled: bool,
    pub keywords: Vec<String>,
    pub categories: Vec<CategoryTopic>,
    pub brand_ids: Vec<String>,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            goldbox_enabled: true,
            keywords: Vec::new(),
            categories: Vec::new(),
            brand_ids: Vec::new(),
        }
    }
}

/// One configurable best-category sub-source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTopic {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// Automation toggles and human-readable schedule times
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub max_products_per_run: usize,
    /// Collection time of day, `HH:MM`
    pub collect_time: String,
    /// Review generation time of day, `HH:MM`
    pub review_time: String,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_products_per_run: 10,
            collect_time: "02:00".to_string(),
            review_time: "03:00".to_string(),
        }
    }
}

/// Retry backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempt ceiling; reaching it is terminal
    pub max_attempts: u32,
    /// Base backoff delay in minutes
    pub base_delay_minutes: u64,
    /// Maximum jobs processed per sweep pass
    pub sweep_batch_size: usize,
    /// Sweep timer interval in minutes
    pub sweep_interval_minutes: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_minutes: 5,
            sweep_batch_size: 20,
            sweep_interval_minutes: 5,
        }
    }
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotifySettings {
    pub webhook_url: String,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if self.prompt.min_length == 0 || self.prompt.min_length > self.prompt.max_length {
            anyhow::bail!("prompt length bounds must satisfy 0 < min <= max");
        }

        if !(0.0..=1.0).contains(&self.prompt.tone_score_threshold) {
            anyhow::bail!("tone_score_threshold must be within [0, 1]");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }

        if self.retry.base_delay_minutes == 0 {
            anyhow::bail!("retry.base_delay_minutes must be greater than 0");
        }

        if self.automation.max_products_per_run == 0 {
            anyhow::bail!("automation.max_products_per_run must be greater than 0");
        }

        Ok(())
    }

    /// Enabled category sub-sources
    pub fn enabled_categories(&self) -> Vec<&CategoryTopic> {
        self.topics.categories.iter().filter(|c| c.enabled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_vendor_is_configured() {
        let mut vendor = VendorSettings::default();
        assert!(!vendor.is_configured());

        vendor.enabled = true;
        vendor.access_key = "ak".to_string();
        vendor.secret_key = "sk".to_string();
        assert!(vendor.is_configured());
    }

    #[test]
    fn test_invalid_length_bounds() {
        let mut settings = Settings::default();
        settings.prompt.min_length = 200;
        settings.prompt.max_length = 100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_retry_attempts() {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_enabled_categories_filter() {
        let mut settings = Settings::default();
        settings.topics.categories = vec![
            CategoryTopic {
                id: "1016".to_string(),
                name: "가전".to_string(),
                enabled: true,
            },
            CategoryTopic {
                id: "1017".to_string(),
                name: "뷰티".to_string(),
                enabled: false,
            },
        ];

        let enabled = settings.enabled_categories();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "1016");
    }

    #[test]
    fn test_settings_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[vendor]
enabled = true
access_key = "ak"
secret_key = "sk"
sub_id = "blog"

[automation]
enabled = true
max_products_per_run = 20
collect_time = "04:30"
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert!(settings.vendor.is_configured());
        assert_eq!(settings.automation.max_products_per_run, 20);
        assert_eq!(settings.automation.collect_time, "04:30");
        // Untouched sections fall back to defaults
        assert_eq!(settings.prompt.min_length, 90);
    }
}
