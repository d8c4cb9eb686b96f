use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use warden_bot::application::errors::{BotError, ConfigError};
use warden_bot::application::messaging::{default_gates, Dispatcher, RateLimitGate};
use warden_bot::application::services::{AuditLog, ConnectionSupervisor};
use warden_bot::domain::entities::CommandRegistry;
use warden_bot::domain::traits::{Gateway, StorageGateway};
use warden_bot::extensions::ExtensionManager;
use warden_bot::infrastructure::adapters::{ConsoleGateway, TelegramGateway};
use warden_bot::infrastructure::config::{Config, GatewayKind};
use warden_bot::infrastructure::database::SqliteStore;

/// Gateway events buffered between the connection and the dispatcher
const EVENT_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "warden-bot")]
#[command(about = "A moderation bot with a per-group audit log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Telegram bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => load_config(&cli.config, cli.token).and_then(run),
        Commands::Version => {
            println!("warden-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &str, token: Option<String>) -> Result<Config, BotError> {
    let mut config = if Path::new(path).exists() {
        Config::load(path)?
    } else {
        tracing::info!("No config at {}, using defaults", path);
        Config::default()
    };
    config.apply_env();
    if let Some(token) = token {
        config.set_telegram_token(token);
    }
    config.validate()?;
    Ok(config)
}

fn run(config: Config) -> Result<(), BotError> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;
    rt.block_on(run_bot(config))
}

async fn run_bot(config: Config) -> Result<(), BotError> {
    tracing::info!("Starting {}", config.bot.name);

    let store: Arc<dyn StorageGateway> = Arc::new(SqliteStore::open(&config.database.path, config.database.pool_size)?);
    let audit = AuditLog::new(Arc::clone(&store));

    let mut registry = CommandRegistry::new();
    let mut extensions = ExtensionManager::builtin(audit.clone());
    extensions.load_all(&config.extensions.enabled, &mut registry).await?;
    let registry = Arc::new(registry);
    tracing::info!("{} command(s) registered", registry.len());

    let gateway: Arc<dyn Gateway> = match config.gateway.kind {
        GatewayKind::Console => Arc::new(ConsoleGateway::new(config.bot.name.clone())),
        GatewayKind::Telegram => {
            let token = config
                .telegram_token()
                .ok_or_else(|| ConfigError::MissingField("gateway.telegram.token".to_string()))?;
            Arc::new(TelegramGateway::new(token))
        }
    };

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::clone(&gateway),
        events_tx,
        config.gateway.reconnect_delay(),
    ));

    let limits = &config.security.rate_limit;
    let rate_limit = limits
        .enabled
        .then(|| RateLimitGate::new(limits.max_requests, limits.window_seconds));
    let dispatcher = Arc::new(
        Dispatcher::new(config.bot.prefix.clone(), Arc::clone(&registry), Arc::clone(&gateway))
            .with_gates(default_gates(rate_limit))
            .with_audit(audit),
    );
    let mut dispatch_loop = tokio::spawn(Arc::clone(&dispatcher).run(Arc::clone(&supervisor), events_rx));

    if let Err(fault) = supervisor.login().await {
        if !fault.kind.is_recoverable() {
            extensions.shutdown_all().await;
            return Err(fault.into());
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        result = &mut dispatch_loop => {
            if let Err(e) = result {
                tracing::error!("Dispatch loop stopped: {}", e);
            }
        }
    }

    dispatch_loop.abort();
    extensions.shutdown_all().await;
    tracing::info!("Connection state at exit: {:?}", supervisor.state());
    Ok(())
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}
