//! WireGuard sync daemon (wgsyncd)
//!
//! Creates the wg0 interface and keeps it in sync with the config file that
//! wireguard-ui edits.
//!
//! # Usage
//!
//! ```bash
//! # Start with the defaults (/etc/wireguard/wg0.conf, 10.32.42.0/24)
//! sudo wgsyncd
//!
//! # Different subnet, verbose logging
//! sudo SUBNET=192.168.5.0/28 wgsyncd --verbose
//! ```

use anyhow::Context;
use clap::Parser;
use libwgsync::{Lifecycle, NotifySource, RuntimeConfig, SystemRunner};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// WireGuard sync daemon
#[derive(Parser, Debug)]
#[command(name = "wgsyncd")]
#[command(author = "wgsync contributors")]
#[command(version)]
#[command(about = "A wireguard-ui compatible wireguard server configuration tool")]
#[command(long_about = "\
Creates and manages a wireguard interface with the goal of simulating a LAN
for a set of machines. Compatible with wireguard-ui: the interface config is
hot-reloaded whenever the config file changes.

Environment Variables:
  INTERFACE_CONFIG_PATH  Path to the interface config. Defaults to /etc/wireguard/wg0.conf
  SUBNET                 Subnet served by the interface. The first address is assigned
                         to the server. Defaults to 10.32.42.0/24")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting WireGuard sync daemon (wgsyncd)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "linux")]
    {
        let uid = unsafe { libc::geteuid() };
        if uid != 0 {
            warn!("Not running as root - interface setup will most likely fail");
        }
    }

    match run().await {
        Ok(()) => {
            info!("WireGuard sync daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("A critical error occurred while running the wireguard server: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env().context("unable to load the config")?;
    info!(
        config_path = %config.config_path().display(),
        subnet = %config.subnet,
        address = %config.interface_address(),
        "Resolved settings"
    );

    let runner = SystemRunner;
    let lifecycle = Lifecycle::new(&config, &runner);
    let source = NotifySource::new()?;

    let stats = lifecycle
        .run_until(source, shutdown_signal())
        .await
        .context("the wireguard server stopped")?;

    info!(events = stats.events, applies = stats.applies, "Reconciliation finished");
    Ok(())
}

/// Initialize logging based on command-line arguments
fn init_logging(args: &Args) {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!("wgsyncd={},libwgsync={}", log_level, log_level))
        });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}

/// Resolve on SIGTERM or SIGINT. If the handlers cannot be installed the
/// daemon keeps running and relies on default signal handling.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to register signal handlers: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, stopping"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), stopping"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, stopping");
    }
}
