//! kline - K-line wake-up shell
//!
//! Opens the configured serial port, runs the slow-init handshake and holds
//! the control unit in diagnostic mode until interrupted.
//!
//! # Usage
//!
//! ```bash
//! kline ports
//! kline --port /dev/ttyUSB0 connect --hold-secs 30
//! kline --config kline.json connect --release-blocking
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kline_core::protocol::{list_ports, Outcome, PortConfig, SerialLink, Session};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kline")]
#[command(about = "Wake an automotive control unit over a K-line serial adapter")]
struct Args {
    /// Port configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration file
    #[arg(short, long)]
    port: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Print the effective port configuration
    Config,
    /// Run the wake-up handshake and hold the link
    Connect {
        /// Release the link after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        hold_secs: Option<u64>,

        /// Release with the blocking disconnect, so the port is free on exit
        #[arg(long)]
        release_blocking: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "kline=debug,kline_core=debug"
    } else {
        "kline=info,kline_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;

    match args.command {
        Command::Ports => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match (port.usb_id, port.product) {
                    (Some((vid, pid)), product) => println!(
                        "{}  [{:04x}:{:04x}] {}",
                        port.name,
                        vid,
                        pid,
                        product.unwrap_or_default()
                    ),
                    (None, _) => println!("{}", port.name),
                }
            }
            Ok(())
        }
        Command::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
        Command::Connect {
            hold_secs,
            release_blocking,
        } => run_connect(config, hold_secs.map(Duration::from_secs), release_blocking).await,
    }
}

fn load_config(args: &Args) -> Result<PortConfig> {
    let mut config = match &args.config {
        Some(path) => PortConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PortConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port_name = port.clone();
    }
    config.validate().context("Invalid port configuration")?;
    Ok(config)
}

async fn run_connect(
    config: PortConfig,
    hold: Option<Duration>,
    release_blocking: bool,
) -> Result<()> {
    info!(
        port = %config.port_name,
        baud = config.baud_rate,
        "connecting"
    );
    let session = Arc::new(Session::new(SerialLink::new(config)));

    let mut attempt = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };

    let outcome = tokio::select! {
        res = &mut attempt => res?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, cancelling handshake");
            session.cancel_current_operation();
            attempt.await?
        }
    };

    let connected = outcome.is_succeeded();
    report("connect", &outcome);

    if connected {
        match hold {
            Some(hold) => {
                info!(secs = hold.as_secs(), "holding link");
                tokio::select! {
                    _ = tokio::time::sleep(hold) => {}
                    _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                }
            }
            None => {
                info!("link ready, press Ctrl+C to release");
                tokio::signal::ctrl_c().await?;
            }
        }

        if release_blocking {
            let blocking = session.clone();
            let released = tokio::task::spawn_blocking(move || blocking.disconnect_blocking()).await?;
            info!(released, "blocking release finished");
        }
    }

    let teardown = session.shutdown().await;
    report("shutdown", &teardown);

    if connected {
        Ok(())
    } else {
        anyhow::bail!("handshake {}", outcome)
    }
}

fn report(step: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Succeeded => info!("{} succeeded", step),
        Outcome::Cancelled => warn!("{} cancelled", step),
        Outcome::Failed(e) => warn!("{} failed: {}", step, e),
    }
}
