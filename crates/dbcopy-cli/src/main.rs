//! dbcopy CLI - copy and verify whole databases across SQL dialects.

use clap::{Parser, Subcommand};
use dbcopy::pipeline::{JsonProgress, LogProgress};
use dbcopy::{drivers, Config, CopyError, CopyJob, CopyPipeline, HookRegistry, PageSize};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbcopy")]
#[command(about = "Copy and verify whole relational databases across SQL dialects")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy schema, data and indexes from one store to another
    Copy {
        /// Source connection URL (overrides the config file)
        source: Option<String>,

        /// Destination connection URL (overrides the config file)
        destination: Option<String>,

        /// Rows per page, or "unbounded" to stream each table [default: 1000]
        #[arg(long)]
        page_size: Option<PageSize>,

        /// Verify every row after copying
        #[arg(long)]
        verify: bool,

        /// Table to skip (repeatable, or comma-separated)
        #[arg(long = "except", value_delimiter = ',')]
        except: Vec<String>,

        /// Tables processed concurrently within a phase
        #[arg(long)]
        workers: Option<usize>,

        /// Skip the built-in dialect corrections
        #[arg(long)]
        no_hooks: bool,
    },

    /// Test connections to both stores
    HealthCheck {
        /// Source connection URL (overrides the config file)
        source: Option<String>,

        /// Destination connection URL (overrides the config file)
        destination: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Copy {
            source,
            destination,
            page_size,
            verify,
            except,
            workers,
            no_hooks,
        } => {
            let mut config = load_config(cli.config.as_ref(), source, destination)?;
            if let Some(page_size) = page_size {
                config.copy.page_size = page_size;
            }
            if verify {
                config.copy.verify = true;
            }
            config.copy.exclude_tables.extend(except);
            if let Some(w) = workers {
                config.copy.workers = Some(w);
            }
            if no_hooks {
                config.copy.disable_builtin_hooks = true;
            }
            config.validate()?;

            let source = drivers::connect(&config.source).await?;
            let destination = drivers::connect(&config.destination).await?;

            let hooks = if config.copy.disable_builtin_hooks {
                HookRegistry::new()
            } else {
                HookRegistry::with_builtins()
            };
            let job = CopyJob::from_config(&config.copy, source.clone(), destination.clone());
            let pipeline = if cli.progress {
                CopyPipeline::new(job, hooks).with_progress(JsonProgress)
            } else {
                CopyPipeline::new(job, hooks).with_progress(LogProgress)
            };

            let result = tokio::select! {
                result = pipeline.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nReceived Ctrl-C. Stopping copy...");
                    Err(CopyError::Store("copy interrupted".to_string()))
                }
            };

            source.disconnect().await;
            destination.disconnect().await;
            let report = result?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report.summary);
                println!("\nCopy completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {}/{} ({} excluded)",
                    report.tables_copied, report.tables_total, report.tables_excluded
                );
                println!("  Rows: {}", report.rows_copied);
                println!("  Indexes: {}", report.indexes_created);
                if let Some(rows) = report.rows_verified {
                    println!("  Verified: {} rows", rows);
                }
            }
        }

        Commands::HealthCheck {
            source,
            destination,
        } => {
            let config = load_config(cli.config.as_ref(), source, destination)?;
            config.validate()?;

            let source = check_store(&config.source).await;
            let destination = check_store(&config.destination).await;
            let healthy = source.error.is_none() && destination.error.is_none();

            if cli.output_json {
                let result = serde_json::json!({
                    "source_connected": source.error.is_none(),
                    "source_latency_ms": source.latency_ms,
                    "source_error": source.error,
                    "destination_connected": destination.error.is_none(),
                    "destination_latency_ms": destination.latency_ms,
                    "destination_error": destination.error,
                    "healthy": healthy,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for (role, check) in [("Source", &source), ("Destination", &destination)] {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        role,
                        check.dialect,
                        if check.error.is_none() { "OK" } else { "FAILED" },
                        check.latency_ms
                    );
                    if let Some(ref err) = check.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if let Some(err) = source.failure.or(destination.failure) {
                return Err(err);
            }
        }
    }

    Ok(())
}

/// Config file (if any) with command-line URLs applied over it.
fn load_config(
    path: Option<&PathBuf>,
    source: Option<String>,
    destination: Option<String>,
) -> Result<Config, CopyError> {
    let mut config = match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let (Some(source), Some(destination)) = (source.as_ref(), destination.as_ref())
            else {
                return Err(CopyError::Config(
                    "source and destination URLs are required without --config".to_string(),
                ));
            };
            Config::from_urls(source.clone(), destination.clone())
        }
    };

    if let Some(url) = source {
        config.source.url = url;
    }
    if let Some(url) = destination {
        config.destination.url = url;
    }
    Ok(config)
}

struct StoreCheck {
    dialect: String,
    latency_ms: u128,
    error: Option<String>,
    failure: Option<CopyError>,
}

async fn check_store(config: &dbcopy::StoreConfig) -> StoreCheck {
    let start = Instant::now();
    match drivers::connect(config).await {
        Ok(store) => {
            let check = StoreCheck {
                dialect: store.dialect().to_string(),
                latency_ms: start.elapsed().as_millis(),
                error: None,
                failure: None,
            };
            store.disconnect().await;
            check
        }
        Err(e) => StoreCheck {
            dialect: config.redacted_url(),
            latency_ms: start.elapsed().as_millis(),
            error: Some(e.to_string()),
            failure: Some(e),
        },
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the summary and JSON results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
