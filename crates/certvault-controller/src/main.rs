//! secret-controller - certvault certificate lifecycle controller
//!
//! Obtains a secret-store token through the wrapped-token hand-off, then
//! issues, rotates and revokes certificates for labelled Services.

use std::time::Duration;

use certvault_broker::{obtain_token, AcquireSettings, ControllerClient};
use certvault_controller::{
    event_channels, run_event_loop, run_rotation_loop, run_sweep, run_watcher, ControllerConfig,
    ControllerContext, KubeCluster,
};
use certvault_store::{VaultClient, VaultToken, WrappingClient};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "secret-controller")]
#[command(about = "Issue, rotate and revoke TLS certificates for Kubernetes Services")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ControllerConfig,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch Services and manage their certificates
    ///
    /// Without --vault-token the controller requests its own token from the
    /// broker once and exits if the callback does not arrive within
    /// --callback-timeout-secs; it does not keep waiting.
    Run {
        /// Seconds between rotation sweeps (0 disables them)
        #[arg(long, default_value_t = 300)]
        rotation_interval: u64,
    },

    /// Run one rotation sweep and exit
    ///
    /// Token acquisition behaves as for `run`.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = cli.config;
    config.validate()?;
    info!(vault = %config.vault_addr, "starting secret-controller");

    tokio::select! {
        result = run(config, cli.command) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received, exiting");
            Ok(())
        }
    }
}

async fn run(config: ControllerConfig, command: Commands) -> anyhow::Result<()> {
    let token = acquire_token(&config).await?;
    let store = VaultClient::new(&config.vault_addr, token)?;
    let client = kube::Client::try_default().await?;
    let cluster = KubeCluster::new(client, config.watch_namespace.clone());
    let ctx = ControllerContext::new(store, cluster, config.settings());

    match command {
        Commands::Check => {
            let report = run_sweep(&ctx, Utc::now()).await?;
            info!(
                rotated = report.rotated.len(),
                healthy = report.healthy.len(),
                skipped = report.skipped.len(),
                "check complete"
            );
            Ok(())
        }
        Commands::Run { rotation_interval } => {
            let (sink, source) = event_channels();
            let watcher = tokio::spawn(run_watcher(ctx.cluster.services(), sink));

            let rotation = (rotation_interval > 0).then(|| {
                tokio::spawn(run_rotation_loop(
                    ctx.clone(),
                    Duration::from_secs(rotation_interval),
                ))
            });

            let event_loop = tokio::spawn(run_event_loop(ctx, source));

            let result = match watcher.await {
                Ok(Ok(())) => {
                    warn!("service watch ended");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "service watcher failed");
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            };

            if let Some(rotation) = rotation {
                rotation.abort();
            }
            if let Err(e) = event_loop.await {
                warn!(error = %e, "event loop task failed");
            }
            result
        }
    }
}

async fn acquire_token(config: &ControllerConfig) -> anyhow::Result<VaultToken> {
    if let Some(token) = &config.vault_token {
        info!("using secret-store token from configuration");
        return Ok(VaultToken::new(token.as_str()));
    }

    let settings = AcquireSettings::new(&config.name, &config.namespace)
        .with_budget(0)
        .with_callback_timeout(config.callback_timeout());

    let token = obtain_token(
        config.broker_addr,
        WrappingClient::new(&config.vault_addr)?,
        None,
        ControllerClient::new(config.controller_addr.as_str())?,
        settings,
    )
    .await?;

    info!("received secret-store token");
    Ok(token)
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("secret_controller=info".parse()?)
        .add_directive("certvault_controller=info".parse()?)
        .add_directive("certvault_broker=info".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
