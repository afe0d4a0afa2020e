//! Submission relay - main entry point
//!
//! Wires the JSON file store, the configured destinations and the built-in
//! strategies into a processor, then either consumes queue tasks from stdin
//! with a worker pool or processes individual requests.

use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use submission_relay::config::RelayConfig;
use submission_relay::model::RequestId;
use submission_relay::observability::{init_default_logging, init_logging, metrics, LogFormat};
use submission_relay::queue::{InMemoryTaskQueue, QueueTask, TaskQueue};
use submission_relay::resolver::StoreRoutingResolver;
use submission_relay::store::{JsonFileStore, MemoryDestinationStore};
use submission_relay::strategy::StrategyFactory;
use submission_relay::{SubmissionProcessor, WorkerPool};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};

/// Queue-driven submission relay
#[derive(Parser)]
#[command(name = "submission-relay")]
#[command(about = "Hands captured submissions to external destinations and records the outcome")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume queue tasks from stdin (JSON objects or bare request IDs, one per line)
    Run,
    /// Process the given requests once and print one JSON report per request
    Process {
        /// Request IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Move a failed request back to pending
    Requeue {
        /// Request ID
        id: String,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
            init_logging(level, LogFormat::parse(&format), false);
        }
    }

    info!("Starting submission relay v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_relay(config).await,
        Commands::Process { ids } => process_requests(config, ids).await,
        Commands::Requeue { id } => requeue_request(config, id).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Relay shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RelayConfig::load_from_file(path)?);
    }

    for path_str in ["relay.toml", "config/relay.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RelayConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create relay.toml".into())
}

/// Bootstrap: build the processor with its collaborators injected
async fn build_processor(
    config: &RelayConfig,
) -> Result<SubmissionProcessor, Box<dyn std::error::Error>> {
    let store = Arc::new(JsonFileStore::open(&config.storage.data_dir).await?);
    let destinations = Arc::new(MemoryDestinationStore::from_config(&config.destinations));
    let strategies = Arc::new(StrategyFactory::from_config(config)?);

    info!(
        destinations = destinations.len(),
        formats = ?strategies.formats(),
        data_dir = %config.storage.data_dir.display(),
        "Processor ready"
    );

    Ok(SubmissionProcessor::new(
        store.clone(),
        store,
        Arc::new(StoreRoutingResolver::new(destinations)),
        strategies,
    ))
}

async fn run_relay(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        worker_id = %config.worker.id,
        concurrency = config.worker.concurrency,
        "Relay starting"
    );
    metrics().set_worker_state("initializing");

    let processor = Arc::new(build_processor(&config).await?);
    let queue = Arc::new(InMemoryTaskQueue::new(config.worker.max_deliveries));
    let pool = WorkerPool::spawn(config.worker.concurrency, queue.clone(), processor);

    let feeder = tokio::spawn(feed_stdin(queue.clone()));

    let shutdown = pool.shutdown_handle();
    let signal_queue = queue.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, finishing in-flight deliveries");
            metrics().set_worker_state("stopping");
            shutdown.request();
            signal_queue.close().await;
        }
    });

    pool.join().await;
    feeder.abort();

    let dead_letters = queue.dead_letters().await;
    for dead in &dead_letters {
        warn!(
            request_id = %dead.task.request_id,
            attempts = dead.attempts,
            reason = %dead.reason,
            "Task dead-lettered"
        );
    }

    let stats = serde_json::to_string(&metrics().snapshot())?;
    info!(stats = %stats, dead_letters = dead_letters.len(), "Relay stats");
    Ok(())
}

/// Read stdin on a plain thread so a blocked read never holds up shutdown
async fn feed_stdin(queue: Arc<InMemoryTaskQueue>) {
    let (tx, mut rx) = mpsc::channel::<String>(64);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to read queue input");
                    break;
                }
            }
        }
    });

    while let Some(line) = rx.recv().await {
        match QueueTask::parse_line(&line) {
            Ok(Some(task)) => {
                if let Err(e) = queue.enqueue(task).await {
                    warn!(error = %e, "Task not enqueued");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Skipping input line"),
        }
    }

    info!("Queue input drained");
    queue.close().await;
}

async fn process_requests(
    config: RelayConfig,
    ids: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let processor = build_processor(&config).await?;
    let mut aborted = 0;

    for id in ids {
        match processor.process(&QueueTask::new(id.as_str())).await {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                error!(request_id = %id, error = %e.sanitized_message(), "Processing aborted");
                aborted += 1;
            }
        }
    }

    if aborted > 0 {
        return Err(format!("{aborted} request(s) could not be processed").into());
    }
    Ok(())
}

async fn requeue_request(config: RelayConfig, id: String) -> Result<(), Box<dyn std::error::Error>> {
    let processor = build_processor(&config).await?;
    let request = processor.requeue(&RequestId::from(id)).await?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn handle_config_command(config: &RelayConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(
        destinations = config.destinations.len(),
        "Configuration validation complete"
    );
    Ok(())
}
