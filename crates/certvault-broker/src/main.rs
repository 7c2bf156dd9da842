//! vault-init - certvault bootstrap init container
//!
//! Obtains a secret-store token for this pod through the controller's
//! wrapped-token hand-off, then fetches the service certificate and writes
//! it to the shared secrets directory.

use clap::Parser;
use certvault_broker::artifacts::{fetch_certificates, CertificateBundle, POLL_INTERVAL};
use certvault_broker::bootstrap::retry_budget;
use certvault_broker::config::InitConfig;
use certvault_broker::{obtain_token, ControllerClient};
use certvault_store::{VaultClient, WrappingClient};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "vault-init")]
#[command(about = "Bootstrap a pod's secret-store token and TLS certificate")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: InitConfig,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = cli.config;
    config.validate()?;
    info!(
        name = %config.name,
        namespace = %config.namespace,
        service = %config.service_name,
        "starting vault-init"
    );

    if config.force_refresh {
        config.marker().remove();
        config.artifact_paths().remove_certificates();
    }

    tokio::select! {
        result = bootstrap(&config) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received, exiting");
            Ok(())
        }
    }
}

async fn bootstrap(config: &InitConfig) -> anyhow::Result<()> {
    let marker = config.marker();

    let token = if marker.exists() {
        info!(path = %marker.path().display(), "reusing persisted token");
        marker.read_token()?
    } else {
        std::fs::create_dir_all(&config.secrets_dir)?;
        let unwrapper = WrappingClient::new(&config.vault_addr)?;
        let requester = ControllerClient::new(config.controller_addr.as_str())?;
        obtain_token(
            config.broker_addr,
            unwrapper,
            Some(marker),
            requester,
            config.acquire_settings(),
        )
        .await?
    };

    let store = VaultClient::new(&config.vault_addr, token)?;
    let material = fetch_certificates(
        &store,
        &config.certificate_path(),
        POLL_INTERVAL,
        retry_budget(config.retry_timeout),
    )
    .await?;

    let bundle = CertificateBundle::from_material(&material);
    let paths = config.artifact_paths();
    tokio::task::spawn_blocking(move || bundle.write(&paths)).await??;

    info!("obtained token and certificates, exiting");
    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("vault_init=info".parse()?)
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
