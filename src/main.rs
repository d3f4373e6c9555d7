// Main entrypoint for the swarmspawn operator CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use swarmspawn::config::{Config, ConfigTrait};
use swarmspawn::docker::DockerClient;
use swarmspawn::metrics;
use swarmspawn::model::Overrides;
use swarmspawn::shutdown::GracefulShutdown;
use swarmspawn::store::{FileStore, MemoryStore, SessionStore};
use swarmspawn::{Controller, SpawnError};

const CONFIG_PATH: &str = "cfg/swarmspawn.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/swarmspawn.cfg.local.yaml";
const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:9090";

/// swarmspawn - per-user notebook workloads on Docker swarm
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    cfg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the user's workload and prints its endpoint once reachable
    Start {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "")]
        session: String,
        /// YAML file with per-request overrides
        #[arg(long, value_name = "FILE")]
        overrides: Option<PathBuf>,
    },
    /// Removes the user's workload
    Stop {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "")]
        session: String,
    },
    /// Prints the current phase of the user's workload
    Poll {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "")]
        session: String,
    },
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok(cfg);
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => Ok(cfg),
        Err(_) => Config::load(PathBuf::from(CONFIG_PATH))
            .with_context(|| format!("failed to load config from {}", CONFIG_PATH)),
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout carries the command result
    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn configure_metrics(cfg: &Config) -> Result<()> {
    let Some(m) = cfg.metrics().filter(|m| m.enabled) else {
        return Ok(());
    };
    let listen = m.listen.as_deref().unwrap_or(DEFAULT_METRICS_LISTEN);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address {listen:?}"))?;
    metrics::install_exporter(addr)
}

fn load_overrides(path: &Path) -> Result<Overrides> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read overrides file {:?}", path))?;
    serde_yaml::from_str(&data).with_context(|| format!("parse overrides file {:?}", path))
}

fn build_controller(cfg: &Config, shutdown_token: CancellationToken) -> Result<Controller> {
    let docker = cfg.docker();
    let client = DockerClient::new(&docker).context("failed to create docker client")?;

    let store: Arc<dyn SessionStore> = match cfg.state_path() {
        Some(path) => {
            info!(
                component = "main",
                event = "store_configured",
                path = ?path,
                "session records persisted to file"
            );
            Arc::new(FileStore::new(path))
        }
        None => Arc::new(MemoryStore::new()),
    };

    Ok(Controller::new(
        cfg.service().clone(),
        Arc::new(client),
        store,
        shutdown_token,
    ))
}

async fn run(controller: &Controller, graceful: &GracefulShutdown, command: Command) -> Result<()> {
    match command {
        Command::Start {
            user,
            session,
            overrides,
        } => {
            let overrides = overrides.as_deref().map(load_overrides).transpose()?;
            match controller.start(&user, &session, overrides.as_ref()).await {
                Ok(endpoint) => {
                    println!("{endpoint}");
                    Ok(())
                }
                Err(SpawnError::Cancelled(service)) => {
                    warn!(
                        component = "main",
                        event = "start_interrupted",
                        service = %service,
                        "start interrupted, removing service"
                    );
                    graceful
                        .bounded(controller.stop(&user, &session))
                        .await
                        .context("cleanup after interrupted start")?
                        .with_context(|| format!("failed to remove {service}"))?;
                    anyhow::bail!("start of {service} interrupted")
                }
                Err(e) => Err(e).with_context(|| format!("failed to start workload for {user}")),
            }
        }
        Command::Stop { user, session } => {
            controller
                .stop(&user, &session)
                .await
                .with_context(|| format!("failed to stop workload for {user}"))?;
            println!("stopped");
            Ok(())
        }
        Command::Poll { user, session } => {
            println!("{}", controller.poll(&user, &session).await);
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let cfg = load_cfg(args.cfg)?;
    configure_logger(&cfg);
    configure_metrics(&cfg)?;

    let shutdown_token = CancellationToken::new();
    let graceful = GracefulShutdown::new(shutdown_token.clone());
    let listener = graceful.spawn_listener();

    let controller = build_controller(&cfg, shutdown_token.clone())?;
    let result = run(&controller, &graceful, args.command).await;

    // releases the signal listener
    shutdown_token.cancel();
    let _ = listener.await;
    result
}
