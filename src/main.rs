use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haul::config::{Config, Settings};
use haul::media::ProductImageEnricher;
use haul::notify::{NoopSink, NotificationSink, WebhookSink};
use haul::review::ProviderRegistry;
use haul::service::AutomationService;
use haul::store::{MemoryDraftStore, MemoryItemStore, MemoryRetryStore, StaticSettingsSource};

#[derive(Parser)]
#[command(
    name = "haul",
    version,
    about = "Affiliate product collection and AI review drafting pipeline",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(short, long, global = true, default_value = "settings.toml")]
    settings: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled automation loop until interrupted
    Serve,

    /// Run one collection pass now
    Collect {
        /// Maximum products to collect
        #[arg(short, long, default_value = "10")]
        max_products: usize,
    },

    /// Generate a review draft for one product
    Review {
        /// Product id to review
        product_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("haul pipeline starting");

    let config = Config::from_env()?;
    let settings = Settings::from_file(std::path::Path::new(&cli.settings))
        .with_context(|| format!("Failed to load settings from {}", cli.settings))?;
    settings.validate()?;

    let service = build_service(config, settings)?;

    match cli.command {
        Commands::Serve => {
            tracing::info!("Starting serve command");
            serve(service).await?;
        }

        Commands::Collect { max_products } => {
            tracing::info!(max_products = %max_products, "Starting collect command");
            let outcome = service.collect_manual(max_products).await?;
            println!("Collected {} products", outcome.collected);
            println!("  Goldbox: {}", outcome.stats.goldbox);
            println!("  Categories: {}", outcome.stats.categories);
            println!("  Keywords: {}", outcome.stats.keywords);
            println!("  Brands: {}", outcome.stats.brands);
        }

        Commands::Review { product_id } => {
            tracing::info!(product_id = %product_id, "Starting review command");
            let outcome = service.generate_review(&product_id).await?;
            println!("Draft {} persisted", outcome.draft_id);
            println!("  Provider: {} ({})", outcome.provider, outcome.model);
            println!("  Tone score: {}", outcome.tone_score);
            println!("  Length: {} chars", outcome.char_count);
        }
    }

    tracing::info!("haul completed successfully");
    Ok(())
}

fn build_service(config: Config, settings: Settings) -> Result<AutomationService> {
    let notifier: Arc<dyn NotificationSink> = if settings.notify.webhook_url.is_empty() {
        Arc::new(NoopSink)
    } else {
        Arc::new(WebhookSink::new(
            settings.notify.webhook_url.clone(),
            Duration::from_secs(10),
        )?)
    };

    let registry = ProviderRegistry::new(config.request_timeout())?;

    let service = AutomationService::new(
        config,
        Arc::new(StaticSettingsSource::new(settings)),
        Arc::new(MemoryItemStore::new()),
        Arc::new(MemoryDraftStore::new()),
        Arc::new(MemoryRetryStore::new()),
        notifier,
        Arc::new(ProductImageEnricher),
        registry,
    )?;

    Ok(service)
}

async fn serve(service: AutomationService) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    service.run(shutdown_rx).await?;
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("haul=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("haul=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
