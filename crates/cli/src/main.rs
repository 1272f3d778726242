use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stickerpipe_core::pipeline::settings_from_config;
use stickerpipe_core::{
    load_config, parse_set_name, validate_config, ArchiveSplitter, Config, ConfigError,
    PipelineRequest, SanitizedConfig, SetAcquirer, StickerPipeline,
    StickerSource, TelegramSource, TranscodeOrchestrator, DEFAULT_SIZE_LIMIT,
};

/// Exit code when a stage finished but some stickers failed.
const EXIT_PARTIAL: u8 = 2;

/// Download Telegram sticker sets and convert them to GIFs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "STICKERPIPE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a set, convert it to GIFs and optionally archive the result
    Run {
        /// Set name or https://t.me/addstickers/<name> link
        set: String,
        /// Pack the GIFs into size-bounded zip archives
        #[arg(long)]
        archive: bool,
    },
    /// Download a set without converting it
    Fetch {
        /// Set name or https://t.me/addstickers/<name> link
        set: String,
    },
    /// Convert a directory of stickers, or a single file, to GIFs
    Convert {
        path: PathBuf,
        /// Output directory (default: `gifs` next to the input directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Split a directory into size-bounded zip archives
    Split {
        source: PathBuf,
        output: PathBuf,
        base_name: String,
        /// Maximum uncompressed bytes per archive
        #[arg(long)]
        limit: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, cancelling in-flight work");
        trigger.cancel();
    });

    match args.command {
        Command::Run { set, archive } => {
            let config = load_required(&args.config)?;
            let set_name = set_name(&set)?;
            let pipeline =
                StickerPipeline::from_config(&config).context("Failed to set up pipeline")?;
            pipeline
                .validate()
                .await
                .context("Telegram bot token was rejected")?;

            let mut request = PipelineRequest::new(set_name);
            if archive {
                request = request.with_archive();
            }
            let report = pipeline.run(&request, &cancel).await?;

            info!(
                run_id = %report.run_id,
                downloaded = report.acquisition.downloaded_count(),
                skipped = report.acquisition.skipped_count(),
                failed = report.acquisition.failed_count(),
                "Sticker set processed"
            );
            print_json(args.json, &report)?;
            Ok(exit_code(report.all_succeeded()))
        }
        Command::Fetch { set } => {
            let config = load_required(&args.config)?;
            let set_name = set_name(&set)?;
            let source = TelegramSource::new(config.telegram.clone())
                .context("Failed to create Telegram client")?;
            source
                .validate()
                .await
                .context("Telegram bot token was rejected")?;

            let settings = settings_from_config(&config);
            let report = SetAcquirer::new(Arc::new(source))
                .acquire(
                    &set_name,
                    &settings.output_root,
                    settings.download_concurrency,
                    &cancel,
                )
                .await?;

            info!(
                downloaded = report.downloaded_count(),
                skipped = report.skipped_count(),
                failed = report.failed_count(),
                "Saved to {}",
                report.files_dir.display()
            );
            print_json(args.json, &report)?;
            Ok(exit_code(report.all_succeeded()))
        }
        Command::Convert { path, output } => {
            let converter = load_optional(&args.config)?
                .map(|c| c.converter)
                .unwrap_or_default();
            let orchestrator = TranscodeOrchestrator::from_config(&converter)?;
            let report = orchestrator
                .convert_all(&path, output.as_deref(), converter.concurrency, &cancel)
                .await?;

            print_json(args.json, &report)?;
            Ok(exit_code(report.all_succeeded()))
        }
        Command::Split {
            source,
            output,
            base_name,
            limit,
        } => {
            let limit = match limit {
                Some(limit) => limit,
                None => load_optional(&args.config)?
                    .map(|c| c.archive.size_limit_bytes)
                    .unwrap_or(DEFAULT_SIZE_LIMIT),
            };
            let manifest = ArchiveSplitter::new()
                .with_cancellation(cancel.clone())
                .split(&source, &output, &base_name, limit)
                .await
                .map_err(|e| {
                    for path in e.manifest.paths() {
                        warn!("Archive completed before the failure: {}", path.display());
                    }
                    anyhow!(e)
                })?;

            info!(archives = manifest.len(), "Archives written to {}", output.display());
            print_json(args.json, &manifest)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_required(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default()
    );
    Ok(config)
}

/// Like [`load_required`], but a missing file means defaults.
fn load_optional(path: &Path) -> Result<Option<Config>> {
    match load_config(path) {
        Ok(config) => {
            validate_config(&config).context("Configuration validation failed")?;
            Ok(Some(config))
        }
        Err(ConfigError::FileNotFound(_)) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", path)),
    }
}

fn set_name(input: &str) -> Result<String> {
    parse_set_name(input).ok_or_else(|| anyhow!("Not a sticker set name or link: {}", input))
}

fn exit_code(all_succeeded: bool) -> ExitCode {
    if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    }
}

fn print_json<T: Serialize>(enabled: bool, value: &T) -> Result<()> {
    if enabled {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_archive() {
        let args = Args::try_parse_from([
            "stickerpipe",
            "--config",
            "/etc/stickerpipe.toml",
            "run",
            "https://t.me/addstickers/HotCherry",
            "--archive",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/stickerpipe.toml"));
        assert!(matches!(args.command, Command::Run { archive: true, .. }));
    }

    #[test]
    fn test_set_name_from_link() {
        assert_eq!(
            set_name("https://t.me/addstickers/HotCherry").unwrap(),
            "HotCherry"
        );
        assert!(set_name("not a set").is_err());
    }

    #[test]
    fn test_missing_optional_config_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_optional(&dir.path().join("absent.toml")).unwrap().is_none());
    }
}
