//! drivekv CLI - Command line access to an app-folder key-value store.
//!
//! Every data command signs in (reusing the saved session when possible),
//! loads the whole folder, and for mutating commands saves it back.

mod prompt;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drivekv_common::{AppId, FolderName};
use drivekv_storage::graph::AuthManager;
use drivekv_storage::{AuthConfig, Authenticator, GraphTransport, OAuthAuthenticator};
use drivekv_store::{Database, SaveStrategy, StoreConfig};

use crate::prompt::TerminalPrompt;
use crate::session::SessionStore;

#[derive(Parser)]
#[command(name = "drivekv")]
#[command(about = "drivekv - Key-value records in your OneDrive app folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON store configuration file (overrides --app-id and --folder).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application (client) ID registered with Microsoft.
    #[arg(short, long, global = true)]
    app_id: Option<String>,

    /// Folder under the app root holding the records.
    #[arg(short, long, global = true, default_value = "drivekv")]
    folder: String,

    /// Phase order of saves.
    #[arg(long, global = true, value_enum)]
    strategy: Option<Strategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    DeleteFirst,
    WriteFirst,
}

impl From<Strategy> for SaveStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::DeleteFirst => SaveStrategy::DeleteFirst,
            Strategy::WriteFirst => SaveStrategy::WriteFirst,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in interactively and save the session.
    Login,

    /// Forget the saved session.
    Logout,

    /// Print one value as JSON.
    Get {
        /// Record key.
        key: String,
    },

    /// Set a value and save.
    Set {
        /// Record key.
        key: String,

        /// JSON value; anything that is not valid JSON is stored as a string.
        value: String,
    },

    /// Remove a value and save.
    Remove {
        /// Record key.
        key: String,
    },

    /// List record keys.
    List,

    /// Print every record as one JSON object.
    Dump,

    /// Remove every record and save.
    Clear {
        /// Skip the confirmation check.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = store_config(&cli)?;
    let sessions = SessionStore::default_location()?;

    match cli.command {
        Commands::Login => cmd_login(config, &sessions).await,
        Commands::Logout => cmd_logout(&config, &sessions),
        Commands::Get { key } => cmd_get(config, &sessions, &key).await,
        Commands::Set { key, value } => cmd_set(config, &sessions, key, &value).await,
        Commands::Remove { key } => cmd_remove(config, &sessions, &key).await,
        Commands::List => cmd_list(config, &sessions).await,
        Commands::Dump => cmd_dump(config, &sessions).await,
        Commands::Clear { yes } => cmd_clear(config, &sessions, yes).await,
    }
}

/// Build the store configuration from the file or the flags.
fn store_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let app_id = cli
                .app_id
                .as_deref()
                .context("Either --config or --app-id is required")?;
            StoreConfig::new(
                AppId::new(app_id).context("Invalid app id")?,
                FolderName::new(cli.folder.as_str()).context("Invalid folder name")?,
            )
        }
    };

    if let Some(strategy) = cli.strategy {
        config = config.with_save_strategy(strategy.into());
    }
    Ok(config)
}

/// An authenticator seeded with the saved session.
fn authenticator(config: &StoreConfig, sessions: &SessionStore) -> Result<Arc<OAuthAuthenticator>> {
    let manager = AuthManager::new(AuthConfig::new(&config.app_id))
        .context("Failed to configure sign-in")?;
    let authenticator = OAuthAuthenticator::new(manager, Arc::new(TerminalPrompt));

    Ok(Arc::new(match sessions.load(&config.app_id)? {
        Some(tokens) => authenticator.with_tokens(tokens),
        None => authenticator,
    }))
}

/// Persist whatever tokens the authenticator holds now.
async fn persist_session(
    config: &StoreConfig,
    sessions: &SessionStore,
    authenticator: &OAuthAuthenticator,
) -> Result<()> {
    if let Some(tokens) = authenticator.tokens().await {
        sessions.save(&config.app_id, &tokens)?;
    }
    Ok(())
}

/// Sign in, provision the folder and load every record.
async fn open_database(config: StoreConfig, sessions: &SessionStore) -> Result<Database> {
    let authenticator = authenticator(&config, sessions)?;
    let transport = Arc::new(GraphTransport::new().context("Failed to create HTTP client")?);
    let mut db = Database::new(config.clone(), transport, authenticator.clone());

    let result = db.init().await.map(|_| ());
    // A login may have happened even if a later step failed
    persist_session(&config, sessions, &authenticator).await?;
    result.with_context(|| format!("Failed to open folder '{}'", config.folder_name))?;

    Ok(db)
}

async fn save_database(db: &Database) -> Result<()> {
    let acks = db.save().await.context("Failed to save records")?;
    info!("Wrote {} record files", acks.len());
    Ok(())
}

/// Sign in interactively.
async fn cmd_login(config: StoreConfig, sessions: &SessionStore) -> Result<()> {
    let authenticator = authenticator(&config, sessions)?;
    authenticator.login().await.context("Sign-in failed")?;
    persist_session(&config, sessions, &authenticator).await?;

    println!("Signed in to app {}", config.app_id);
    Ok(())
}

/// Forget the saved session.
fn cmd_logout(config: &StoreConfig, sessions: &SessionStore) -> Result<()> {
    if sessions.clear(&config.app_id)? {
        println!("Signed out of app {}", config.app_id);
    } else {
        println!("No saved session for app {}", config.app_id);
    }
    Ok(())
}

/// Print one value.
async fn cmd_get(config: StoreConfig, sessions: &SessionStore, key: &str) -> Result<()> {
    let db = open_database(config, sessions).await?;
    let value = db
        .get(key)
        .with_context(|| format!("No record named '{}'", key))?;

    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Set a value and save.
async fn cmd_set(
    config: StoreConfig,
    sessions: &SessionStore,
    key: String,
    value: &str,
) -> Result<()> {
    let value = parse_value(value);
    let mut db = open_database(config, sessions).await?;

    let previous = db.set(key.as_str(), &value)?;
    save_database(&db).await?;

    match previous {
        Some(_) => println!("Updated '{}'", key),
        None => println!("Created '{}'", key),
    }
    Ok(())
}

/// Remove a value and save.
async fn cmd_remove(config: StoreConfig, sessions: &SessionStore, key: &str) -> Result<()> {
    let mut db = open_database(config, sessions).await?;

    if db.remove(key).is_none() {
        anyhow::bail!("No record named '{}'", key);
    }
    save_database(&db).await?;

    println!("Removed '{}'", key);
    Ok(())
}

/// List keys in sorted order.
async fn cmd_list(config: StoreConfig, sessions: &SessionStore) -> Result<()> {
    let db = open_database(config, sessions).await?;

    let mut keys: Vec<_> = db.records().keys().collect();
    keys.sort();
    for key in keys {
        println!("{}", key);
    }
    Ok(())
}

/// Print every record.
async fn cmd_dump(config: StoreConfig, sessions: &SessionStore) -> Result<()> {
    let db = open_database(config, sessions).await?;

    let sorted: std::collections::BTreeMap<_, _> = db.records().iter().collect();
    println!("{}", serde_json::to_string_pretty(&sorted)?);
    Ok(())
}

/// Remove every record and save.
async fn cmd_clear(config: StoreConfig, sessions: &SessionStore, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to delete every record without --yes");
    }
    let mut db = open_database(config, sessions).await?;

    let count = db.len();
    db.clear();
    save_database(&db).await?;

    println!("Removed {} records", count);
    Ok(())
}

/// Interpret a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
