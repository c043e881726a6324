use clap::{Parser, Subcommand};
use mailbox_rs::api::{ApiServer, AppState};
use mailbox_rs::config::{Config, LoggingConfig};
use mailbox_rs::intake::IntakePipeline;
use mailbox_rs::provider::{BrevoConnector, CloudflareConnector};
use mailbox_rs::provisioning::Provisioner;
use mailbox_rs::smtp::{SmtpRelay, SmtpServer};
use mailbox_rs::store::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mailbox-rs")]
#[command(about = "Self-hosted mailbox: mail intake and routing setup", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SMTP listener and the HTTP API (default)
    Serve,
    /// Validate the configuration and print the effective values
    CheckConfig,
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mailbox_rs={},tower_http=info", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            println!("{}", config.to_toml()?);
            println!("✓ Configuration is valid");
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    init_logging(&config.logging);

    info!("Starting mailbox-rs v{}", env!("CARGO_PKG_VERSION"));
    info!("  SMTP listening on: {}", config.smtp.listen_addr);
    info!("  API listening on: {}", config.server.api_listen_addr);
    info!("  Relay smarthost: {}", config.relay.smarthost);

    let store = SqliteStore::connect(&config.storage.database_url).await?;
    info!("Database ready at {}", config.storage.database_url);

    let relay = SmtpRelay::new(config.relay.smarthost.clone(), config.server.hostname.clone());
    let intake = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(relay),
        config.intake.max_attachment_size,
    );

    let provisioner = Provisioner::new(
        Arc::new(store),
        Arc::new(CloudflareConnector::new(&config.cloudflare)),
        Arc::new(BrevoConnector::new(&config.brevo)),
        config.cloudflare.worker_name.clone(),
    );

    let state = Arc::new(AppState::new(
        provisioner,
        intake.clone(),
        config.smtp.max_message_size,
    ));
    let api_server = ApiServer::new(state, config.server.api_listen_addr.clone());
    let api_handle = tokio::spawn(async move { api_server.run().await });

    if !config.smtp.enabled {
        info!("SMTP listener disabled, serving the API only");
        return match api_handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        };
    }

    let smtp_server = SmtpServer::new(config.smtp.clone(), config.server.hostname.clone(), intake);
    let smtp_handle = tokio::spawn(async move { smtp_server.run().await });

    // Wait for either server to exit (or error)
    tokio::select! {
        result = smtp_handle => {
            match result {
                Ok(Ok(())) => info!("SMTP server exited successfully"),
                Ok(Err(e)) => error!("SMTP server error: {}", e),
                Err(e) => error!("SMTP task panic: {}", e),
            }
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server exited successfully"),
                Ok(Err(e)) => error!("API server error: {}", e),
                Err(e) => error!("API task panic: {}", e),
            }
        }
    }

    Ok(())
}
