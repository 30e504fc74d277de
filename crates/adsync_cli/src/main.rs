//! adsync CLI - command-line interface for the ad hierarchy sync engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::connection::ConnectionAction;
use crate::commands::insights::InsightsArgs;
use crate::commands::migrate::MigrateAction;
use crate::commands::shared::OutputFormat;
use crate::commands::status::StatusArgs;
use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "adsync")]
#[command(version)]
#[command(about = "Synchronize an ad account hierarchy into a local database")]
#[command(
    long_about = "adsync mirrors ad accounts, campaigns, ad sets and ads from the Graph API \
into a local database. Syncs run as a chain of stages on a worker pool, honour \
per-type cooldowns and the platform's rate limits, and can be triggered from the \
command line or over HTTP."
)]
#[command(after_long_help = r#"EXAMPLES
    Create the database schema:
        $ adsync migrate up

    Register a connection (token read from ADSYNC_ACCESS_TOKEN):
        $ adsync connection add --user alice --label "Main"

    Sync the whole hierarchy for a connection:
        $ adsync sync 0b6f0c2e-7d5a-4a53-9d0e-3c6f1f0a9b11

    Sync only campaigns, ignoring the cooldown:
        $ adsync sync 0b6f0c2e-7d5a-4a53-9d0e-3c6f1f0a9b11 --type campaigns --force

    Pause two ads:
        $ adsync status 0b6f0c2e-7d5a-4a53-9d0e-3c6f1f0a9b11 --type ads 1201=PAUSED 1202=PAUSED

    Serve the trigger endpoint:
        $ adsync serve --bind 0.0.0.0:8080

    Install zsh completions:
        $ adsync completions zsh --output ~/.zfunc

CONFIGURATION
    adsync reads configuration from:
      1. ~/.config/adsync/config.toml (or $XDG_CONFIG_HOME/adsync/config.toml)
      2. ./adsync.toml
      3. Environment variables (ADSYNC_ prefix, "__" between nested keys)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    ADSYNC_DATABASE__URL            Database connection string (default: ~/.local/state/adsync/adsync.db)
    ADSYNC_GRAPH__APP_ID            App id used for token renewal
    ADSYNC_GRAPH__APP_SECRET        App secret used for token renewal
    ADSYNC_SYNC__WORKERS            Concurrent sync workers
    ADSYNC_SYNC__COOLDOWN_MINUTES   Minimum minutes between syncs of one type
    ADSYNC_STORE__BACKEND           Shared store: database, memory or redis
    ADSYNC_SERVER__BIND             Address the trigger server listens on
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Manage connections
    Connection {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// Sync a connection's hierarchy (or one level of it)
    Sync(SyncArgs),
    /// Serve the HTTP trigger endpoint
    Serve {
        /// Address to listen on (default from config)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Renew access tokens that are about to expire
    Renew {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Change the delivery status of campaigns, ad sets or ads
    Status(StatusArgs),
    /// Fetch performance insights for an object
    Insights(InsightsArgs),
    /// Delete expired entries from the database key-value store
    Purge,
    /// Print or install shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
        /// Directory to install the script into (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the man page, or write one page per command
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up graceful shutdown handler (Ctrl+C)
    shutdown::setup_shutdown_handler();

    // Structured logging when not attached to a TTY, and always for the server
    if !Term::stdout().is_term() || matches!(cli.command, Commands::Serve { .. }) {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("adsync=info,adsync_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell, output } => {
            commands::docs::handle_completions(*shell, output.clone())?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::docs::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load().map_err(|e| format!("Invalid configuration: {e}"))?;

    let database_url = config.database_url().ok_or(
        "Could not determine a database location; set ADSYNC_DATABASE__URL",
    )?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    if let Commands::Migrate { action } = cli.command {
        return commands::migrate::handle_migrate(action, &database_url).await;
    }

    let db = Arc::new(adsync::connect(&database_url).await?);

    match cli.command {
        Commands::Connection { action } => {
            commands::connection::handle_connection(action, &db).await?;
        }
        Commands::Sync(args) => {
            commands::sync::handle_sync(args, &config, &db).await?;
        }
        Commands::Serve { bind } => {
            commands::serve::handle_serve(bind, &config, &db).await?;
        }
        Commands::Renew { output } => {
            commands::renew::handle_renew(output, &config, &db).await?;
        }
        Commands::Status(args) => {
            commands::status::handle_status(args, &config, &db).await?;
        }
        Commands::Insights(args) => {
            commands::insights::handle_insights(args, &config, &db).await?;
        }
        Commands::Purge => {
            let removed = adsync::kv::purge_expired(&db).await?;
            println!("Removed {} expired entr{}.", removed, if removed == 1 { "y" } else { "ies" });
        }
        Commands::Migrate { .. } | Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
