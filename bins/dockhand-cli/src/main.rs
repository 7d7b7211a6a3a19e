use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockhand_core::{
    ContainerSpec, DockerRuntime, LifecycleController, RuntimeConfig, TerminationSignal,
};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(about = "Run a single container with one published TCP port, removed on interrupt", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull an image, start a container, and publish one TCP port
    Run {
        /// Image reference (e.g. nginx:latest)
        #[arg(short, long)]
        image: String,

        /// TCP port, published as 0.0.0.0:<port> -> <port>/tcp
        #[arg(short, long)]
        port: String,

        /// Container name
        #[arg(short, long)]
        name: String,

        /// Docker endpoint override (unix socket path or http(s)/tcp URL)
        #[arg(long)]
        endpoint: Option<String>,

        /// Path to a JSON runtime config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            image,
            port,
            name,
            endpoint,
            config,
        } => run(image, port, name, endpoint, config).await,
    }
}

async fn run(
    image: String,
    port: String,
    name: String,
    endpoint: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if endpoint.is_some() {
        config.endpoint = endpoint;
    }

    let runtime = DockerRuntime::connect(&config)?;
    let controller = LifecycleController::new(runtime);
    let shutdown = CancellationToken::new();

    let spec = ContainerSpec::new(&image, &port, &name);
    let launched = controller
        .launch(spec, shutdown.clone())
        .await
        .with_context(|| format!("failed to launch container '{name}'"))?;

    // The container ID is the one machine-readable output.
    println!("{}", launched.handle.id);
    info!(
        container_id = %launched.handle.id,
        port = %port,
        "container running; press Ctrl+C to stop and remove"
    );

    // OS signals only cancel the token; the controller never exits the
    // process itself, so the exit code is decided here.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let sig = termination_signal().await;
        warn!(signal = %sig, "received shutdown signal");
        signal_token.cancel();
    });

    launched
        .watcher
        .wait()
        .await
        .context("teardown failed after shutdown signal")?;

    info!(name = %name, "clean shutdown complete");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<RuntimeConfig> {
    match path {
        None => Ok(RuntimeConfig::default()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))
        }
    }
}

/// Block until SIGINT or SIGTERM arrives, reporting which one.
async fn termination_signal() -> TerminationSignal {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler");
        tokio::select! {
            _ = signal::ctrl_c() => TerminationSignal::Interrupt,
            _ = sigterm.recv() => TerminationSignal::Terminate,
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        TerminationSignal::Interrupt
    }
}
