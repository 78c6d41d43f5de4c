use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_engine::config::{self, AppConfig};
use notification_engine::metrics;
use notification_engine::{
    FanoutPayload, NotificationStore, NotificationType, SqliteEventSource, StaticIdentity,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_notification_type(s: &str) -> Result<NotificationType, String> {
    match NotificationType::parse(s) {
        NotificationType::Unknown => Err(format!("Unknown notification type: {}", s)),
        notification_type => Ok(notification_type),
    }
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite notifications database.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Id of the user the engine acts as.
    /// Can also be specified in config file.
    #[clap(long)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen for notifications and log every update until Ctrl+C.
    Watch,

    /// Fetch the current notifications once and print them as JSON.
    List,

    /// Marks a single notification as read.
    MarkRead { id: String },

    /// Marks every unread notification as read.
    MarkAllRead,

    /// Deletes a single notification.
    Delete { id: String },

    /// Deletes every read notification.
    DeleteRead,

    /// Sends a notification from the current user to each target.
    Send {
        #[clap(long = "type", value_parser = parse_notification_type)]
        notification_type: NotificationType,

        #[clap(long = "target", required = true)]
        targets: Vec<String>,

        #[clap(long)]
        subject: Option<String>,

        #[clap(long)]
        body: Option<String>,
    },

    /// Prints engine metrics in the Prometheus text format.
    Metrics,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db.clone(),
            user_id: args.user.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration:");
    info!("  db_path: {:?}", app_config.db_path);
    info!("  user_id: {}", app_config.user_id);
    info!("  max_records: {}", app_config.engine.max_records);

    metrics::init_metrics();

    info!(
        "Opening notifications database at {:?}...",
        app_config.db_path
    );
    let source = Arc::new(SqliteEventSource::open(
        &app_config.db_path,
        app_config.engine.poll_interval(),
    )?);
    let identity = Arc::new(StaticIdentity::signed_in(app_config.user_id.clone()));
    let store = NotificationStore::spawn(source, identity, &app_config.engine);

    let result = run_command(&store, cli_args.command).await;
    store.shutdown().await;
    result
}

async fn run_command(store: &NotificationStore, command: Command) -> Result<()> {
    match command {
        Command::Watch => watch(store).await?,
        Command::List => {
            store.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
        Command::MarkRead { id } => {
            store.mark_read(id.as_str()).await?;
            println!("Marked {} as read", id);
        }
        Command::MarkAllRead => {
            store.refresh().await?;
            let count = store.mark_all_read().await?;
            println!("Marked {} notifications as read", count);
        }
        Command::Delete { id } => {
            store.delete(id.as_str()).await?;
            println!("Deleted {}", id);
        }
        Command::DeleteRead => {
            store.refresh().await?;
            let count = store.delete_all_read().await?;
            println!("Deleted {} read notifications", count);
        }
        Command::Send {
            notification_type,
            targets,
            subject,
            body,
        } => {
            let mut payload = FanoutPayload::new(notification_type);
            payload.subject_id = subject;
            payload.body = body;
            let report = store.send_fanout_notifications(targets, payload).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Metrics => {
            store.refresh().await?;
            print!("{}", metrics::gather_metrics()?);
        }
    }
    Ok(())
}

async fn watch(store: &NotificationStore) -> Result<()> {
    let mut updates = store.subscribe();
    store.start().await?;
    info!("Watching notifications, press Ctrl+C to stop");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    info!("Notification store stopped");
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                info!(
                    "{} notifications, {} unread, listener {}{}",
                    snapshot.notifications.len(),
                    snapshot.unread_count,
                    snapshot.listener_state,
                    snapshot
                        .last_error
                        .as_ref()
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default()
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }
    }

    store.stop().await?;
    Ok(())
}
