//! Bid gateway process host.
//!
//! Loads settings, installs logging, builds the auction pipeline and keeps the
//! configured remote files synchronized until shutdown.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use error_stack::{Report, ResultExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use bid_gateway_common::auction::{build_pipeline, ReqwestTransport};
use bid_gateway_common::error::GatewayError;
use bid_gateway_common::file_sync::{HttpFileDownloader, RemoteFileSyncer, Sha256Validator};
use bid_gateway_common::privacy::BasicTcfDefiner;
use bid_gateway_common::settings::Settings;

#[derive(Parser)]
#[command(name = "bid-gateway")]
#[command(about = "Server-side bid aggregation gateway")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        short,
        global = true,
        env = "BID_GATEWAY_CONFIG",
        default_value = "bid-gateway.toml"
    )]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway until interrupted (default)
    Run,
    /// Load and validate the configuration, then exit
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let settings = match Settings::from_file(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Validate => {
            log::info!("Configuration {} is valid", cli.config.display());
            ExitCode::SUCCESS
        }
        Commands::Run => match run(settings).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Gateway stopped with error: {:?}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(settings: Settings) -> Result<(), Report<GatewayError>> {
    let client = reqwest::Client::builder()
        .build()
        .change_context(GatewayError::Configuration {
            message: "failed to build HTTP client".to_string(),
        })?;

    let pipeline = build_pipeline(
        &settings,
        Arc::new(ReqwestTransport::new(client.clone())),
        Arc::new(BasicTcfDefiner::from_settings(&settings.privacy)),
    );
    log::info!(
        "Auction pipeline ready (partners: {:?}, timeout: {}ms)",
        pipeline.partners(),
        settings.auction.timeout_ms
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let syncers = spawn_syncers(&settings, &client, &shutdown_rx);
    log::info!("Started {} file synchronizers", syncers.len());

    tokio::signal::ctrl_c()
        .await
        .change_context(GatewayError::Configuration {
            message: "failed to listen for shutdown signal".to_string(),
        })?;
    log::info!("Shutdown requested");
    shutdown_tx.send_replace(true);

    for (name, task) in syncers {
        if let Err(e) = task.await {
            log::error!("File synchronizer '{}' ended abnormally: {}", name, e);
        }
    }

    Ok(())
}

fn spawn_syncers(
    settings: &Settings,
    client: &reqwest::Client,
    shutdown: &watch::Receiver<bool>,
) -> Vec<(String, JoinHandle<()>)> {
    settings
        .file_sync
        .iter()
        .map(|config| {
            let downloader = Arc::new(HttpFileDownloader::new(client.clone()));
            let mut syncer = RemoteFileSyncer::new(config.clone(), downloader);
            if let Some(checksum) = &config.checksum_sha256 {
                syncer = syncer.with_validator(Arc::new(Sha256Validator::new(checksum.as_str())));
            }

            let mut shutdown = shutdown.clone();
            let task = tokio::spawn(syncer.run(async move {
                while !*shutdown.borrow_and_update() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            }));
            (config.name.clone(), task)
        })
        .collect()
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .expect("Failed to initialize logger");
}
