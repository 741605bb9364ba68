//! Stockflow Worker - background job runner

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stockflow_common::logging::{init_logging, LogConfig, LogLevel};
use stockflow_engine::config::Config;
use stockflow_engine::events::spawn_dispatcher;
use stockflow_engine::import::CsvImportEngine;
use stockflow_engine::jobs::{BulkDeleteJobRunner, ImportJobRunner};
use stockflow_engine::models::WebhookEvent;
use stockflow_engine::products::{PgProductStore, ProductStore};
use stockflow_engine::progress::{ProgressBridge, ProgressStore, RedisProgressStore};
use stockflow_engine::webhooks::{PgWebhookStore, WebhookDeliverer, WebhookEngine};
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "stockflow-worker")]
#[command(author, version, about = "Stockflow background job runner")]
struct Cli {
    /// Job to run
    #[command(subcommand)]
    job: Job,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Job {
    /// Import products from a CSV file
    Import {
        /// CSV file path
        #[arg(short, long)]
        file: PathBuf,

        /// Job identifier (generated when omitted)
        #[arg(short, long)]
        job_id: Option<String>,
    },

    /// Delete all products in batches
    BulkDelete {
        /// Job identifier (generated when omitted)
        #[arg(short, long)]
        job_id: Option<String>,
    },

    /// Send a test delivery to one webhook
    TestWebhook {
        /// Webhook id
        #[arg(short, long)]
        id: Uuid,

        /// Event name to send, e.g. product.created
        #[arg(short, long, default_value = "product.created")]
        event: WebhookEvent,

        /// JSON payload (a default test payload when omitted)
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Follow a job's progress until it reaches a terminal state
    Watch {
        /// Job identifier
        #[arg(short, long)]
        job_id: String,
    },

    /// Look up one product by SKU
    Product {
        /// SKU, matched case-insensitively
        #[arg(short, long)]
        sku: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("stockflow-worker".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = Config::from_env()?;

    match cli.job {
        Job::Import { file, job_id } => {
            let job_id = job_id.unwrap_or_else(new_job_id);
            info!(job_id = %job_id, file = %file.display(), "running import job");

            let pool = config.database.connect().await?;
            let products = Arc::new(PgProductStore::new(pool.clone()));
            let progress: Arc<dyn ProgressStore> =
                Arc::new(RedisProgressStore::connect(&config.redis_url).await?);

            let webhooks = Arc::new(
                WebhookEngine::new(
                    Arc::new(PgWebhookStore::new(pool)),
                    WebhookDeliverer::new(),
                )
                .with_concurrency(config.webhooks.fan_out_concurrency),
            );
            let (events, dispatcher) = spawn_dispatcher(webhooks);

            let import =
                CsvImportEngine::new(products).with_batch_size(config.import.batch_size);
            let runner = ImportJobRunner::new(import, progress, events);
            let result = runner.run(&job_id, &file).await;

            // Dropping the runner closes the bus; wait for remaining
            // webhook deliveries (including import.failed) to drain.
            drop(runner);
            dispatcher.await.context("event dispatcher panicked")?;

            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Job::BulkDelete { job_id } => {
            let job_id = job_id.unwrap_or_else(new_job_id);
            info!(job_id = %job_id, "running bulk delete job");

            let pool = config.database.connect().await?;
            let products = Arc::new(PgProductStore::new(pool));
            let progress: Arc<dyn ProgressStore> =
                Arc::new(RedisProgressStore::connect(&config.redis_url).await?);

            let runner = BulkDeleteJobRunner::new(products, progress);
            let deleted = runner.run(&job_id).await?;
            println!("Bulk delete {job_id}: {deleted} products deleted");
        },
        Job::TestWebhook { id, event, payload } => {
            let payload = payload
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("payload is not valid JSON")?;

            let pool = config.database.connect().await?;
            let engine = WebhookEngine::new(
                Arc::new(PgWebhookStore::new(pool)),
                WebhookDeliverer::new(),
            );
            let outcome = engine.send_test(id, event, payload).await?;

            if outcome.success {
                println!(
                    "Delivered in {} attempt(s), status {}",
                    outcome.attempts,
                    outcome.status_code.unwrap_or_default()
                );
            } else {
                println!(
                    "Failed after {} attempt(s): {}",
                    outcome.attempts,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        },
        Job::Watch { job_id } => {
            let store: Arc<dyn ProgressStore> =
                Arc::new(RedisProgressStore::connect(&config.redis_url).await?);
            let bridge = ProgressBridge::new(store);

            let (tx, mut rx) = tokio::sync::mpsc::channel(32);
            let follower = tokio::spawn(async move { bridge.run(&job_id, tx).await });

            while let Some(snapshot) = rx.recv().await {
                println!(
                    "{} {} {}% ({}/{})",
                    snapshot.job_id,
                    snapshot.status,
                    snapshot.percent,
                    snapshot.current,
                    snapshot.total
                );
            }

            follower.await.context("progress follower panicked")??;
        },
        Job::Product { sku } => {
            let pool = config.database.connect().await?;
            let products = PgProductStore::new(pool);
            match products.find_by_sku(&sku).await? {
                Some(product) => println!("{}", serde_json::to_string_pretty(&product)?),
                None => println!("No product with SKU {sku}"),
            }
        },
    }

    info!("Job complete");
    Ok(())
}

fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}
