//! credbroker CLI
//!
//! Command-line front end for the credbroker credential helper. Useful for
//! inspecting what docker would receive and for managing third-party
//! credentials by hand.
//!
//! # Usage
//!
//! ```bash
//! # Show what docker would get for a registry
//! credbroker get https://gcr.io
//!
//! # Resolve a GCR access token, overriding the configured sources
//! credbroker token --source env --source gcloud_sdk
//!
//! # List every registry the helper knows about
//! credbroker list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credbroker_core::{
    CredStore, CredentialHelper, Credentials, FileCredStore, GcloudSdkToken, KeyringCredStore,
    KeyringSecretStore, Timeout, TokenResolver,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::{BrokerConfig, StoreBackend};

#[derive(Parser)]
#[command(name = "credbroker")]
#[command(about = "Registry credential helper with GCR token resolution")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every known registry and its username
    List,

    /// Print the credentials docker would receive for a registry
    Get {
        /// Registry server URL or host
        server_url: String,
    },

    /// Store credentials for a third-party registry
    Add {
        /// Registry server URL or host
        server_url: String,

        /// Username to store
        username: String,

        /// Secret to store
        #[arg(long, env = "CREDBROKER_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Remove stored credentials for a third-party registry
    Delete {
        /// Registry server URL or host
        server_url: String,
    },

    /// Resolve a GCR access token
    Token {
        /// Token source to try, in order (repeatable; defaults to the configured list)
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// Report whether a server URL is a GCR registry
    Classify {
        /// Registry server URL or host
        server_url: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);
    debug!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::List => list(&config).await,
        Commands::Get { server_url } => get(&config, &server_url).await,
        Commands::Add {
            server_url,
            username,
            secret,
        } => add(&config, Credentials::new(server_url, username, secret)).await,
        Commands::Delete { server_url } => delete(&config, &server_url).await,
        Commands::Token { sources } => token(&config, sources).await,
        Commands::Classify { server_url } => classify(&config, &server_url),
        Commands::Config => show_config(&config),
    }
}

fn init_logging(config: &BrokerConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &BrokerConfig) -> Result<Arc<dyn CredStore>> {
    let store: Arc<dyn CredStore> = match config.store_backend {
        StoreBackend::Keyring => {
            let path = match &config.store_path {
                Some(path) => path.clone(),
                None => KeyringCredStore::default_path()?,
            };
            let secrets = Arc::new(
                KeyringSecretStore::try_default().context("OS keyring is not available")?,
            );
            debug!("Using keyring credential store with index at {:?}", path);
            Arc::new(KeyringCredStore::load_from_path(path, secrets)?)
        }
        StoreBackend::File => {
            let path = match &config.store_path {
                Some(path) => path.clone(),
                None => FileCredStore::default_path()?,
            };
            debug!("Using plaintext credential file at {:?}", path);
            Arc::new(FileCredStore::load_from_path(path)?)
        }
    };
    Ok(store)
}

fn build_helper(config: &BrokerConfig) -> Result<CredentialHelper> {
    let store = open_store(config).context("Failed to open credential store")?;
    let mut resolver = TokenResolver::from_env(store.clone(), config.token_sources.clone());

    if let Some(secs) = config.gcloud_timeout_secs {
        resolver = resolver.with_gcloud_sdk(Box::new(Timeout::new(
            GcloudSdkToken::new(),
            Duration::from_secs(secs),
            "gcloud_sdk",
        )));
    }

    Ok(CredentialHelper::new(store, config.registries(), resolver))
}

async fn list(config: &BrokerConfig) -> Result<()> {
    let helper = build_helper(config)?;
    let listing = helper.list().await?;
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

async fn get(config: &BrokerConfig, server_url: &str) -> Result<()> {
    let helper = build_helper(config)?;
    let (username, secret) = helper.get(server_url).await?;

    let response = json!({
        "ServerURL": server_url,
        "Username": username,
        "Secret": secret.expose(),
    });
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn add(config: &BrokerConfig, creds: Credentials) -> Result<()> {
    let helper = build_helper(config)?;
    helper.add(&creds).await?;
    println!("Stored credentials for {}", creds.server_url);
    Ok(())
}

async fn delete(config: &BrokerConfig, server_url: &str) -> Result<()> {
    let helper = build_helper(config)?;
    helper.delete(server_url).await?;
    println!("Deleted credentials for {}", server_url);
    Ok(())
}

async fn token(config: &BrokerConfig, sources: Vec<String>) -> Result<()> {
    let helper = build_helper(config)?;
    let resolver = helper.resolver();

    let token = if sources.is_empty() {
        resolver.resolve_access_token().await?
    } else {
        resolver.resolve(&sources).await?
    };

    println!("{}", token);
    Ok(())
}

fn classify(config: &BrokerConfig, server_url: &str) -> Result<()> {
    let privileged = config.registries().is_privileged(server_url);
    println!(
        "{}",
        json!({ "ServerURL": server_url, "privileged": privileged })
    );
    Ok(())
}

fn show_config(config: &BrokerConfig) -> Result<()> {
    println!("# loaded from {:?}", config.config_path);
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
