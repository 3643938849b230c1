//! wpp-gateway: WhatsApp relay gateway main binary
//!
//! Usage:
//!   wpp-gateway                   - Start the gateway (HTTP API + WhatsApp session)
//!   wpp-gateway --port 8080       - Override the HTTP port
//!   wpp-gateway --help            - Show help

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wpp_api::AppState;
use wpp_core::{Config, CredentialStore, DeliveryStore};
use wpp_whatsapp::{DeliveryRecorder, WhatsAppBot};

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Start the gateway with optional overrides
    Server(Overrides),
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Values given on the command line; they win over env and file config
#[derive(Debug, Default, PartialEq)]
struct Overrides {
    port: Option<u16>,
    data_path: Option<PathBuf>,
    client_id: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(path) = self.data_path {
            match config.session.credential_store {
                CredentialStore::Remote(_) => {
                    tracing::warn!("--data-path ignored: a remote credential store is configured")
                }
                CredentialStore::Local(_) => {
                    config.session.credential_store = CredentialStore::Local(path)
                }
            }
        }
        if let Some(client_id) = self.client_id {
            config.session.client_id = client_id;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let overrides = match parse_args(&args)? {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wpp-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server(overrides) => overrides,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration (wpp-gateway.toml, then environment)
    let mut config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    overrides.apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting wpp-gateway...");
    tracing::info!(
        "Client: {}, credential store: {}",
        config.session.client_id,
        config.session.credential_store
    );

    run_server(config).await
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> anyhow::Result<RunMode> {
    let mut overrides = Overrides::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--port" | "-p" => {
                let value = flag_value(arg, iter.next())?;
                overrides.port = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("Invalid port: {}", value))?,
                );
            }
            "--data-path" | "-d" => {
                overrides.data_path = Some(PathBuf::from(flag_value(arg, iter.next())?));
            }
            "--client-id" | "-i" => {
                overrides.client_id = Some(flag_value(arg, iter.next())?.to_string());
            }
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(RunMode::Server(overrides))
}

fn flag_value<'a>(flag: &str, value: Option<&'a String>) -> anyhow::Result<&'a str> {
    value
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
}

/// Print help message
fn print_help() {
    println!("wpp-gateway - WhatsApp relay gateway");
    println!();
    println!("Usage:");
    println!("  wpp-gateway [options]");
    println!();
    println!("Options:");
    println!("  -p, --port <PORT>         HTTP API port (default: 3000)");
    println!("  -d, --data-path <PATH>    Local credential directory (default: .wwebjs_auth)");
    println!("  -i, --client-id <ID>      Session client id (default: default)");
    println!("  -h, --help                Show this help message");
    println!("  -v, --version             Show version");
    println!();
    println!("Environment Variables:");
    println!("  PORT                      HTTP API port");
    println!("  WPP_CLIENT_ID             Session client id");
    println!("  WPP_DATA_PATH             Local credential directory");
    println!("  REMOTE_DB_URL             Remote credential store URL (takes precedence)");
    println!("  WPP_BRIDGE_URL            Messaging bridge URL (default: http://localhost:8085)");
    println!("  WPP_DB_PATH               Delivery log database path");
    println!("  WPP_DRIVER_TIMEOUT_SECS   Deadline for every driver call (default: 30)");
    println!("  WPP_RECONNECT_INITIAL_MS  First reconnect backoff (default: 1000)");
    println!("  WPP_RECONNECT_MAX_MS      Backoff ceiling (default: 60000)");
    println!("  WPP_RECONNECT_MAX_ATTEMPTS  Give up after this many attempts (default: never)");
}

/// Run the gateway (HTTP API + WhatsApp session)
async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = DeliveryStore::open(&config.delivery.db_path)
        .map_err(|e| anyhow::anyhow!("Failed to open delivery log: {}", e))?;

    let bot = WhatsAppBot::new(config.session.clone());
    let recorder = DeliveryRecorder::new(bot.dispatcher(), Arc::new(store));
    let state = AppState::new(bot.session(), recorder);

    // Track running services for graceful shutdown
    let mut service_handles = Vec::new();

    match bot.start() {
        Ok(handle) => {
            service_handles.push(handle);
            tracing::info!("WhatsApp session started");
        }
        Err(e) => {
            tracing::error!("WhatsApp session could not start: {}", e);
            tracing::warn!("HTTP API keeps running; session queries will report the driver as unavailable");
        }
    }

    // Start HTTP API server
    let api_config = config.api.clone();
    let api_port = api_config.port;
    let handle = tokio::spawn(async move {
        if let Err(e) = wpp_api::start_server(api_config, state).await {
            tracing::error!("HTTP API error: {}", e);
        }
    });
    service_handles.push(handle);
    tracing::info!("HTTP API server started on port {}", api_port);

    tracing::info!("wpp-gateway initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    // Abort all services
    for handle in service_handles {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
