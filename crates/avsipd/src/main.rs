//! avsipd - AVSIP daemon
//!
//! Collects periodic readings from vehicle data sources (OBD-II, CAN bus,
//! mesh-radio GPS) and fans them out to mesh broadcast, MQTT and Traccar.
//!
//! Usage:
//!   avsipd [OPTIONS] [config.toml]
//!
//! If no config file is provided, runs with mock transports for demo
//! purposes.

use avsip_can::ByteOrder;
use avsip_pipeline::config::{CanSignalConfig, Config};
use avsip_pipeline::Pipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Pipeline config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args { config_path: None };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            _ => {
                tracing::warn!("Unknown argument: {}", args[i]);
                i += 1;
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"avsipd - AVSIP vehicle telemetry daemon

Usage: avsipd [OPTIONS] [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run fully mocked (no hardware needed)
  avsipd

  # Run with a config file
  avsipd avsip.toml

Logging is controlled with RUST_LOG, e.g.
  RUST_LOG=avsipd=debug,avsip_pipeline=debug avsipd avsip.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avsipd=info,avsip_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting avsipd");

    let args = parse_args();

    // Configuration errors are the one fatal failure class; everything past
    // this point degrades per component instead of exiting
    let config = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        Config::from_path(path)?
    } else {
        tracing::info!("No config file provided, using mock transports");
        demo_config()
    };

    let (pipeline, shutdown) = Pipeline::build(config).await?;
    let runner = tokio::spawn(pipeline.run());

    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.shutdown();

    runner.await?;
    tracing::info!("avsipd stopped");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Hardware-free demo configuration: mock OBD/CAN/mesh, no network sinks
fn demo_config() -> Config {
    let mut config = Config::default();
    config.general.data_interval_seconds = 5;
    config.obd.enabled = true;
    config.can.enabled = true;
    config.can.signals = vec![
        CanSignalConfig {
            id: "0x123".to_string(),
            name: "EngineSpeed".to_string(),
            start_byte: 0,
            length_bytes: 2,
            byte_order: ByteOrder::Big,
            is_signed: false,
            scale: 0.25,
            offset: 0.0,
        },
        CanSignalConfig {
            id: "0x123".to_string(),
            name: "CoolantTemp".to_string(),
            start_byte: 2,
            length_bytes: 1,
            byte_order: ByteOrder::Big,
            is_signed: false,
            scale: 1.0,
            offset: -40.0,
        },
    ];
    config
}
