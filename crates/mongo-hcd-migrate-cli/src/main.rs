//! mongo-hcd-migrate CLI - batch migration from MongoDB to DataStax HCD.

use clap::{Parser, Subcommand, ValueEnum};
use mongo_hcd_migrate::{
    orchestrator, Config, Document, MigrateError, MigrationSummary, Orchestrator, RunStatus,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Sample subscriber inserted by `seed` when no file is given.
const SAMPLE_SUBSCRIBER: &str = include_str!("../fixtures/sample_subscriber.json");

#[derive(Parser)]
#[command(name = "mongo-hcd-migrate")]
#[command(about = "Batch migration from MongoDB to DataStax HCD")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate documents (default when no command is given)
    Run {
        /// Override documents per batch
        #[arg(long)]
        batch_size: Option<u64>,

        /// Override number of workers (1 = sequential)
        #[arg(long)]
        workers: Option<usize>,

        /// Override document cap (0 = no cap)
        #[arg(long)]
        max_documents: Option<u64>,

        /// Verify counts and a sample document after migrating
        #[arg(long)]
        verify: bool,
    },

    /// Compare source and target counts and a sample document
    Verify,

    /// Test both store connections
    HealthCheck,

    /// Insert a sample subscriber document into the target
    Seed {
        /// JSON file holding the document [default: built-in sample]
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    // Setup logging; the guard flushes the log file on drop
    let _log_guard = setup_logging(&cli.verbosity, cli.log_format, cli.log_file.as_deref())?;

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(ref path) = cli.config {
        info!("Loaded configuration from {:?}", path);
    }

    let command = cli.command.unwrap_or(Commands::Run {
        batch_size: None,
        workers: None,
        max_documents: None,
        verify: false,
    });

    match command {
        Commands::Run {
            batch_size,
            workers,
            max_documents,
            verify,
        } => {
            // Apply overrides
            if let Some(n) = batch_size {
                config.migration.batch_size = n;
            }
            if let Some(w) = workers {
                config.migration.workers = w;
            }
            if let Some(m) = max_documents {
                config.migration.max_documents = m;
            }
            if verify {
                config.migration.verify_after = true;
            }

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler();

            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(cancel_token).await;
            orchestrator.close().await;
            let summary = result?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary);
            }

            Ok(exit_code(summary.is_success()))
        }

        Commands::Verify => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.verify().await;
            orchestrator.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Verification Results:");
                println!(
                    "  Counts: {} (source: {}, target: {})",
                    if report.counts_match { "MATCH" } else { "MISMATCH" },
                    count_text(report.source_count),
                    count_text(report.target_count)
                );
                println!(
                    "  Sample: {}",
                    if report.sample_fields_match { "MATCH" } else { "MISMATCH" }
                );
                for m in &report.field_mismatches {
                    println!("    {}: source={} target={}", m.field, m.source, m.target);
                }
                println!(
                    "\n  Overall: {}",
                    if report.passed() { "PASSED" } else { "FAILED" }
                );
            }

            match report.failure_summary() {
                Some(reason) => Err(MigrateError::Verification(reason)),
                None => Ok(ExitCode::SUCCESS),
            }
        }

        Commands::HealthCheck => {
            config.validate()?;
            let result = orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MongoDB {}): {}",
                    result.source_uri,
                    if result.source_ok { "OK" } else { "FAILED" }
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (HCD {}): {}",
                    result.target_endpoint,
                    if result.target_ok { "OK" } else { "FAILED" }
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            Ok(exit_code(result.healthy()))
        }

        Commands::Seed { file } => {
            let document = load_seed_document(file.as_deref())?;
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.seed(&document).await;
            orchestrator.close().await;
            let seeded = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&seeded)?);
            } else {
                println!("Sample document inserted: {}", seeded.inserted_id);
                println!(
                    "  Read back by identity: {}",
                    if seeded.found { "yes" } else { "no" }
                );
            }

            Ok(exit_code(seeded.found))
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn count_text(count: Option<u64>) -> String {
    count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unavailable".to_string())
}

fn print_summary(summary: &MigrationSummary) {
    let status_msg = match summary.status {
        RunStatus::Completed => "Migration completed!",
        RunStatus::CompletedWithErrors => "Migration completed with errors.",
        RunStatus::Cancelled => "Migration cancelled.",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Batches: {}/{} ({} skipped)",
        summary.batches_completed, summary.batches_planned, summary.batches_skipped
    );
    println!("  Documents processed: {}", summary.total_documents);
    println!("  Migrated: {}", summary.total_migrated);
    println!("  Errors: {}", summary.total_errors);
    match summary.throughput {
        Some(t) => println!("  Throughput: {:.2} docs/sec", t),
        None => println!("  Throughput: n/a"),
    }
    if let Some(ref report) = summary.verification {
        println!(
            "  Verification: {}",
            if report.passed() { "PASSED" } else { "FAILED" }
        );
    }
}

fn load_seed_document(file: Option<&Path>) -> Result<Document, MigrateError> {
    let json: serde_json::Value = match file {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => serde_json::from_str(SAMPLE_SUBSCRIBER)?,
    };
    Document::from_json(&json)
        .ok_or_else(|| MigrateError::Config("seed document must be a JSON object".to_string()))
}

fn setup_logging(
    verbosity: &str,
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>, MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        other => {
            return Err(MigrateError::Config(format!(
                "verbosity must be one of debug, info, warn, error; got '{}'",
                other
            )))
        }
    };
    // RUST_LOG wins when set
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so --output-json keeps stdout clean
    let console = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed(),
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| MigrateError::Config(format!("invalid log file path: {:?}", path)))?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter())
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    Ok(guard)
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to setup {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Finishing in-flight batches...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to setup Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing in-flight batches...");
        token.cancel();
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_sample_is_a_subscriber() {
        let doc = load_seed_document(None).unwrap();
        assert_eq!(
            doc.get_str("hashMsisdn"),
            Some("9010C99CA6247F5B0EF606AB8A9C6F1BF38E0F65A788FA02B47DD50569C963FA")
        );
        assert_eq!(doc.get_str("provider"), Some("VODAFONE"));
    }

    #[test]
    fn test_cli_parses_without_subcommand() {
        let cli = Cli::try_parse_from(["mongo-hcd-migrate", "--verbosity", "debug"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbosity, "debug");
    }

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::try_parse_from([
            "mongo-hcd-migrate",
            "run",
            "--batch-size",
            "50",
            "--workers",
            "1",
            "--verify",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run {
                batch_size,
                workers,
                verify,
                ..
            }) => {
                assert_eq!(batch_size, Some(50));
                assert_eq!(workers, Some(1));
                assert!(verify);
            }
            _ => panic!("expected run command"),
        }
    }
}
