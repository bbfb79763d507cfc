//! tgshare - share media through a Telegram channel
//!
//! Usage:
//!   tgshare init --bot-token <T> --channel-id <C>  - Write a config file
//!   tgshare serve                                  - Run the HTTP service
//!   tgshare status                                 - Check configuration and bot
//!   tgshare files                                  - List stored files
//!   tgshare delete <id>                            - Delete a stored file

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tgshare::{
    config::{validate_channel_id, Config, StorageBackend},
    metadata::RecordStore,
    server::{self, AppState},
    telegram::{BotClient, MediaRelay},
    Error, Result,
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tgshare")]
#[command(version)]
#[command(about = "Media sharing backed by a Telegram channel")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/tgshare/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new configuration file
    Init {
        /// Bot token from @BotFather
        #[arg(long)]
        bot_token: String,

        /// Channel id (-100...) or @channelname
        #[arg(long)]
        channel_id: String,

        /// Public base URL used in share links
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep records in memory only
        #[arg(long)]
        memory: bool,
    },

    /// Show configuration and check the bot token
    Status,

    /// List stored files
    Files,

    /// Delete a stored file
    Delete {
        /// Record id
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(log_level.into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init {
            bot_token,
            channel_id,
            public_url,
        } => cmd_init(config_path, bot_token, channel_id, public_url),

        Commands::Serve { host, port, memory } => cmd_serve(config_path, host, port, memory),

        Commands::Status => cmd_status(config_path),

        Commands::Files => cmd_files(config_path),

        Commands::Delete { id } => cmd_delete(config_path, &id),
    }
}

/// Config file when present, environment otherwise
fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path)
    } else {
        info!("No config file at {:?}, reading environment", config_path);
        Config::from_env()
    }
}

fn open_store(config: &Config) -> Result<RecordStore> {
    match config.storage.backend {
        StorageBackend::Sled => {
            config.ensure_directories()?;
            RecordStore::open(config.storage.database_path())
        }
        StorageBackend::Memory => {
            warn!("Using in-memory record storage; records are lost on restart");
            RecordStore::temporary()
        }
    }
}

/// Store for commands that work on records a server wrote earlier
fn open_persistent_store(config: &Config) -> Result<RecordStore> {
    if config.storage.backend == StorageBackend::Memory {
        return Err(Error::InvalidConfig(
            "the memory backend only keeps records inside a running server; \
             set storage.backend to \"sled\" to manage files from the command line"
                .to_string(),
        ));
    }
    open_store(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))
}

fn cmd_init(
    config_path: &Path,
    bot_token: String,
    channel_id: String,
    public_url: Option<String>,
) -> Result<()> {
    info!("Initializing tgshare...");

    validate_channel_id(&channel_id)?;

    let mut config = Config::default();
    config.telegram.bot_token = bot_token;
    config.telegram.channel_id = channel_id;
    config.server.public_url = public_url;
    config.validate()?;

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save(config_path)?;
    config.ensure_directories()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Data directory: {:?}", config.storage.data_dir);
    info!("");
    info!("Next steps:");
    info!("  1. Add the bot to the channel as an administrator");
    info!("  2. Run 'tgshare status' to check the bot token");
    info!("  3. Run 'tgshare serve' to start the service");

    Ok(())
}

fn cmd_serve(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    memory: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if memory {
        config.storage.backend = StorageBackend::Memory;
    }

    info!(
        "Starting tgshare on {}:{} ({} storage)",
        config.server.host,
        config.server.port,
        config.storage.backend.as_str()
    );

    let store = open_store(&config)?;
    let relay: Arc<dyn MediaRelay> = Arc::new(BotClient::new(config.telegram.clone())?);

    runtime()?.block_on(server::serve(config, store, relay, server::shutdown_signal()))
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("tgshare Status");
    println!("==============");
    println!();
    println!("Configuration: {:?}", config_path);
    println!("Channel: {}", config.telegram.channel_id);
    println!("Bot API: {}", config.telegram.api_base);
    println!("Listen: {}:{}", config.server.host, config.server.port);
    println!(
        "Public URL: {}",
        config.server.public_url.as_deref().unwrap_or("(from request Host header)")
    );
    println!("Max upload size: {} MB", config.server.max_upload_size / 1024 / 1024);
    println!("Storage: {}", config.storage.backend.as_str());
    if config.storage.backend == StorageBackend::Sled {
        println!("Database: {:?}", config.storage.database_path());
    }

    let client = BotClient::new(config.telegram.clone())?;
    runtime()?.block_on(async {
        match client.check().await {
            Ok(bot) => println!(
                "Telegram: authorized as @{} (id {})",
                bot.username.as_deref().unwrap_or(&bot.first_name),
                bot.id
            ),
            Err(e) => println!("Telegram: check failed - {}", e),
        }
    });

    Ok(())
}

fn cmd_files(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_persistent_store(&config)?;
    let records = store.list()?;

    if records.is_empty() {
        println!("No files stored");
        return Ok(());
    }

    let base = config.server.public_url.clone().unwrap_or_else(|| {
        format!("http://{}:{}", config.server.host, config.server.port)
    });

    for record in records {
        println!(
            "{}  {:>10}  {}  {}  {}",
            record.id,
            record.file_size,
            record.uploaded_at.format("%Y-%m-%d %H:%M"),
            record.file_name,
            tgshare::share::share_url(&base, &record.share_link)
        );
    }

    Ok(())
}

fn cmd_delete(config_path: &Path, id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_persistent_store(&config)?;
    let relay: Arc<dyn MediaRelay> = Arc::new(BotClient::new(config.telegram.clone())?);
    let state = AppState::new(config, store, relay);

    runtime()?.block_on(async {
        let record = state.delete_file(id).await?;
        state.store.flush().await?;
        println!("Deleted {} ({})", record.id, record.file_name);
        Ok::<_, Error>(())
    })
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
