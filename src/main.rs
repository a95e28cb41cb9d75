//! `robolink` command-line tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use robolink::{
    build_coordinator, init_logging_with, ConfigStore, ConnectHandlers, LogFormat, PortDescriptor,
    PortKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Discover and talk to robotics boards over serial or the local network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: per-user config directory)
    #[arg(short, long, env = "ROBOLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connectable ports
    Ports,

    /// Connect to a port and print every line it sends
    Monitor {
        /// Serial device path, or `<id>:<ip>` as printed by `ports`
        path: String,

        /// Serial bit rate (default: configured rate)
        #[arg(short, long)]
        baud: Option<u32>,
    },

    /// Select and persist the board type
    Board {
        /// Board name, e.g. `uno` or `nano`
        board: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging_with(format)?;

    let store = match args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location().context("Failed to locate config directory")?,
    };

    match args.command {
        Command::Ports => list_ports(store).await,
        Command::Monitor { path, baud } => monitor(store, path, baud).await,
        Command::Board { board } => {
            let coordinator = build_coordinator(Handle::current(), store);
            coordinator
                .select_board(board.as_str())
                .with_context(|| format!("Failed to save board {}", board))?;
            println!("Board set to {}", board);
            Ok(())
        }
    }
}

async fn list_ports(store: ConfigStore) -> Result<()> {
    let coordinator = build_coordinator(Handle::current(), store);

    // Warm the roster so this enumeration already sees network devices.
    if let Err(e) = coordinator.network().sweep().await {
        tracing::warn!("Probe sweep failed: {}", e);
    }

    let ports = enumerate(&coordinator).await?;
    if ports.is_empty() {
        println!("No ports found");
    }
    for port in ports {
        println!("{:<7} {}", port.kind, port.path);
    }
    Ok(())
}

async fn enumerate(coordinator: &robolink::DefaultCoordinator) -> Result<Vec<PortDescriptor>> {
    let (tx, rx) = oneshot::channel();
    coordinator.enumerate_ports(Box::new(move |ports| {
        let _ = tx.send(ports);
    }));
    rx.await.context("Port enumeration was dropped")
}

async fn monitor(store: ConfigStore, path: String, baud: Option<u32>) -> Result<()> {
    let coordinator = build_coordinator(Handle::current(), store);
    if let Some(baud) = baud {
        coordinator.set_baud_rate(baud);
    }

    // Network paths are only known once the device has answered a probe.
    if path.contains(':') {
        if let Err(e) = coordinator.network().sweep().await {
            tracing::warn!("Probe sweep failed: {}", e);
        }
    }
    let ports = enumerate(&coordinator).await?;
    let port = ports
        .into_iter()
        .find(|p| p.path == path)
        .unwrap_or_else(|| PortDescriptor::serial(path.clone()));

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<Option<String>>();
    let (open_tx, open_rx) = oneshot::channel();
    let closed_tx = line_tx.clone();

    coordinator.connect(
        port.clone(),
        ConnectHandlers::new(
            Arc::new(move |line| {
                let _ = line_tx.send(Some(line));
            }),
            Box::new(move || {
                let _ = closed_tx.send(None);
            }),
        ),
        Box::new(move |resolved| {
            let _ = open_tx.send(resolved);
        }),
    );

    let timeout = match port.kind {
        PortKind::Serial => Duration::from_secs(5),
        PortKind::Network => {
            Duration::from_millis(coordinator.network().settings().handshake_timeout_ms + 1000)
        }
    };
    let resolved = tokio::time::timeout(timeout, open_rx)
        .await
        .ok()
        .and_then(|r| r.ok())
        .with_context(|| format!("Could not connect to {}", path))?;
    println!("Connected to {} (Ctrl-C to quit)", resolved);

    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                Some(Some(line)) => println!("{}", line),
                _ => {
                    println!("Connection closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let (done_tx, done_rx) = oneshot::channel();
                coordinator.disconnect(Some(Box::new(move || {
                    let _ = done_tx.send(());
                })));
                let _ = tokio::time::timeout(Duration::from_secs(2), done_rx).await;
                break;
            }
        }
    }
    Ok(())
}
