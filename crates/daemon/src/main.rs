//! GitWikiSync daemon entry point.
//!
//! Loads configuration, logs in to the wiki, opens the working copies, and
//! drives the polling scheduler until terminated.

mod scheduler;
mod signals;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gitwikisync_core::config::AppConfig;
use gitwikisync_core::git::GitClient;
use gitwikisync_core::identity::IdentityMapper;
use gitwikisync_core::mapper::NameMapper;
use gitwikisync_core::sync_engine::SyncEngine;
use gitwikisync_core::wiki::MediaWikiClient;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// GitWikiSync synchronization daemon.
#[derive(Parser, Debug)]
#[command(
    name = "gitwikisync-daemon",
    version,
    about = "Bidirectional MediaWiki/Git synchronization daemon"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "~/.config/gitwikisync/config.toml")]
    config: String,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Force a full resync of every matched page on the first cycle.
    #[arg(long)]
    resync: bool,

    /// Run a single sync cycle and exit.
    #[arg(long)]
    once: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load, resolve, and validate configuration. Any problem here is fatal.
    let config_path = expand_tilde(&args.config);
    let config =
        AppConfig::load_and_resolve(&config_path).context("failed to load configuration")?;

    // Initialize tracing.
    let log_level = args.log_level.as_deref().unwrap_or(&config.global.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Startup banner
    info!("========================================");
    info!("  GitWikiSync Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", config_path);
    info!("Wiki API      : {}", config.global.api_url);
    info!("Bot user      : {}", config.global.bot_username);
    info!("Repos root    : {}", config.global.repositories_root.display());
    info!("Bindings      : {}", config.repos.len());
    info!("Sleep         : {}s", config.global.sleep_seconds);
    info!("Log level     : {}", log_level);
    info!("========================================");

    let bot_password = config
        .global
        .bot_password
        .clone()
        .with_context(|| format!("env var '{}' is not set", config.global.bot_password_env))?;

    let identity = IdentityMapper::new(config.global.identity_file.as_deref())
        .context("failed to load identity mapping")?;

    // One engine per binding, each owning its working copy and wiki session.
    let mut engines = Vec::with_capacity(config.repos.len());
    for binding in &config.repos {
        let mapper = NameMapper::new(binding.force_extension.as_deref())
            .with_context(|| format!("invalid name mapping for binding '{}'", binding.name))?;

        let repo_path = binding.working_copy(&config.global.repositories_root);
        let repo = GitClient::open(&repo_path, &binding.branch)
            .with_context(|| format!("failed to open working copy for '{}'", binding.name))?;

        let wiki = MediaWikiClient::connect(
            &config.global.api_url,
            &config.global.bot_username,
            &bot_password,
            &binding.namespace,
            binding.title_filter()?,
        )
        .await
        .with_context(|| format!("failed to connect to wiki for '{}'", binding.name))?;

        let engine = SyncEngine::new(
            binding,
            &config.global,
            wiki,
            repo,
            mapper,
            identity.clone(),
        )?;
        info!(binding = %binding.name, path = %repo_path.display(), "binding initialized");
        engines.push(engine);
    }

    if args.resync {
        info!("full resync requested for the first cycle");
        for engine in &mut engines {
            engine.request_full_resync();
        }
    }

    if args.once {
        scheduler::run_once(&mut engines).await;
        return Ok(());
    }

    let shutdown = signals::setup_signal_handlers();
    let interval = Duration::from_secs(config.global.sleep_seconds);
    scheduler::run_polling_loop(&mut engines, interval, shutdown).await;

    info!("GitWikiSync daemon stopped.");
    Ok(())
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
