use anyhow::{Error, Result, anyhow};
use notification_service::{api::run_api_server, config::Config};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("notification_service=info,tower_http=info")),
        )
        .with(fmt::layer().json())
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::load()?;

    info!(
        port = config.server_port,
        secret_store = ?config.secret_store,
        audit_sink = ?config.audit_sink,
        email_provider = ?config.email_provider,
        "Configuration validated"
    );

    run_api_server(config).await
}
