//! foodset-collector - food image dataset collector
//!
//! Runs reconciliation passes from the command line or serves the HTTP API
//! that triggers them and reports dataset readiness.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use foodset_common::config::{self, TomlConfig};
use foodset_common::CategoryRegistry;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foodset_collector::config::CollectorConfig;
use foodset_collector::models::{Partition, PassMode};
use foodset_collector::services::{HttpImageProvider, Reconciler};
use foodset_collector::AppState;

/// Command-line arguments for foodset-collector
#[derive(Parser, Debug)]
#[command(name = "foodset-collector")]
#[command(about = "Collects and validates per-category food images for model training")]
#[command(version)]
struct Cli {
    /// TOML config file (default: FOODSET_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and images
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 5790, env = "FOODSET_PORT")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Fetch images until every category meets its quota
    Reconcile {
        #[command(flatten)]
        partitions: PartitionArg,

        /// Request the full quota for every category
        #[arg(long)]
        seed: bool,
    },
    /// Validate and record images already on disk
    Sync {
        #[command(flatten)]
        partitions: PartitionArg,
    },
    /// Delete corrupt images from every category directory
    Validate {
        #[command(flatten)]
        partitions: PartitionArg,
    },
    /// Print dataset statistics
    Stats {
        #[command(flatten)]
        partitions: PartitionArg,

        #[arg(long)]
        json: bool,
    },
    /// Export trainable (path, label) pairs as JSON
    Export {
        #[arg(long, default_value = "train", value_parser = parse_partition)]
        partition: Partition,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PartitionArg {
    /// train, eval or all
    #[arg(long, default_value = "all")]
    partition: String,
}

impl PartitionArg {
    fn resolve(&self) -> Result<Vec<Partition>> {
        if self.partition.eq_ignore_ascii_case("all") {
            return Ok(Partition::ALL.to_vec());
        }
        Ok(vec![parse_partition(&self.partition).map_err(anyhow::Error::msg)?])
    }
}

fn parse_partition(raw: &str) -> std::result::Result<Partition, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&toml_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build = env!("GIT_HASH"),
        built_at = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting foodset-collector"
    );

    let root_folder = config::resolve_root_folder(cli.root_folder.as_deref(), &toml_config);
    let collector_config = Arc::new(
        CollectorConfig::from_toml(root_folder, &toml_config)
            .context("Invalid [collector] configuration")?,
    );
    let registry = Arc::new(
        CategoryRegistry::from_config(&toml_config.categories)
            .context("Invalid [[categories]] configuration")?,
    );

    collector_config
        .ensure_directories()
        .context("Failed to initialize root folder")?;

    info!(
        root_folder = %collector_config.root_folder.display(),
        categories = registry.len(),
        workers = collector_config.workers,
        "Configuration loaded"
    );

    let db_path = collector_config.database_path();
    let pool = foodset_collector::db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let api_key = config::resolve_provider_api_key(&toml_config);
    if api_key.is_none() {
        warn!(
            "No image search API key ({} or [provider] api_key); fetch jobs will fail",
            config::PROVIDER_API_KEY_ENV
        );
    }
    let provider = HttpImageProvider::new(&toml_config.provider, api_key)
        .context("Failed to build image provider")?;

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&collector_config),
        Arc::clone(&registry),
        pool.clone(),
        Arc::new(provider),
    ));

    match cli.command {
        Command::Serve { port, host } => serve(AppState::new(pool, reconciler), &host, port).await,
        Command::Reconcile { partitions, seed } => {
            let mode = if seed { PassMode::Seed } else { PassMode::Reconcile };
            reconcile(&reconciler, partitions.resolve()?, mode).await
        }
        Command::Sync { partitions } => {
            for partition in partitions.resolve()? {
                let report = reconciler.sync_partition(partition).await?;
                println!("{}: {}", partition, report);
            }
            Ok(())
        }
        Command::Validate { partitions } => {
            for partition in partitions.resolve()? {
                let report = reconciler.sweep(partition).await?;
                println!(
                    "{}: checked {} files, deleted {}, could not delete {}",
                    partition,
                    report.checked(),
                    report.deleted.len(),
                    report.delete_errors.len()
                );
            }
            Ok(())
        }
        Command::Stats { partitions, json } => stats(&reconciler, partitions.resolve()?, json).await,
        Command::Export { partition, output } => {
            let samples = reconciler.recorder().labeled_samples(partition).await?;
            let body = serde_json::to_string_pretty(&samples)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(samples = samples.len(), path = %path.display(), "Exported samples");
                }
                None => println!("{}", body),
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over `[logging] level`
fn init_tracing(toml_config: &TomlConfig) {
    let level = &toml_config.logging.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "foodset_collector={level},foodset_common={level},tower_http={level}",
            level = level
        )
        .into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let app = foodset_collector::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown_pass().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn reconcile(reconciler: &Reconciler, partitions: Vec<Partition>, mode: PassMode) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight jobs");
            on_interrupt.cancel();
        }
    });

    for partition in partitions {
        if cancel.is_cancelled() {
            break;
        }
        let summary = reconciler.run_pass(partition, mode, &cancel).await?;
        println!("{}", summary);
        print!("{}", reconciler.recorder().training_status(partition).await?);
    }

    Ok(())
}

async fn stats(reconciler: &Reconciler, partitions: Vec<Partition>, json: bool) -> Result<()> {
    let recorder = reconciler.recorder();

    if json {
        let body = if partitions.len() == 1 {
            serde_json::to_string_pretty(&recorder.get_statistics(partitions[0]).await?)?
        } else {
            let mut all = BTreeMap::new();
            for partition in partitions {
                all.insert(partition.as_str(), recorder.get_statistics(partition).await?);
            }
            serde_json::to_string_pretty(&all)?
        };
        println!("{}", body);
        return Ok(());
    }

    for partition in partitions {
        print!("{}", recorder.training_status(partition).await?);
        println!("  on disk:");
        for (category, count) in reconciler.inventory(partition) {
            println!("    {}: {}", category, count);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
