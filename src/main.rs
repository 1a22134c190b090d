use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quotabar::config::{ConfigSource, QuotaConfig, CONFIG_ENV};
use quotabar::credentials::{CredentialStore, SecretEnvironment, SecretKind};
use quotabar::fetch::runtime::{self, SHUTDOWN_GRACE};
use quotabar::fetch::{FetchOrchestrator, ProviderId, UsageCache, UsageProvider};
use quotabar::providers::http::HttpClient;
use quotabar::providers::{build_providers, codex, CodexProvider, ProviderContext};
use quotabar::usage::ProviderUsage;
use quotabar::{logging, paths, report};
use std::path::PathBuf;
use std::sync::Arc;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("QUOTABAR_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "quotabar")]
#[command(about = "Usage quotas of Claude, Codex, Gemini and Copilot from local credentials")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Config file (defaults to $QUOTABAR_CONFIG, then ~/.quotabar/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to ~/.quotabar/logs/quotabar.log instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch current usage from every enabled provider (default)
    Usage {
        #[arg(long)]
        json: bool,
    },
    /// List the Codex accounts found across all credential sources
    Accounts {
        #[arg(long)]
        json: bool,
    },
    /// Show every credential location checked and what was found there
    Sources,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = if cli.log_file {
        Some(paths::log_file_path()?)
    } else {
        None
    };
    logging::init(log_path.as_deref())?;

    let env_config = std::env::var(CONFIG_ENV).ok();
    let default_config = paths::config_path().ok();
    let (config, source) = QuotaConfig::discover(
        cli.config.as_deref(),
        env_config.as_deref(),
        default_config.as_deref(),
    )?;
    match &source {
        ConfigSource::File(path) => tracing::debug!("Using config {}", path.display()),
        ConfigSource::Embedded => tracing::debug!("Using built-in config"),
    }

    let store = Arc::new(
        CredentialStore::new(SecretEnvironment::from_process())
            .with_ttl(config.credential_cache_ttl())
            .with_browsers(config.browsers()),
    );

    let command = cli.command.unwrap_or(Command::Usage { json: false });
    runtime::run(
        async move {
            match command {
                Command::Usage { json } => run_usage(&config, store, json).await,
                Command::Accounts { json } => run_accounts(&config, store, json).await,
                Command::Sources => run_sources(store).await,
            }
        },
        SHUTDOWN_GRACE,
    )?
}

async fn run_usage(config: &QuotaConfig, store: Arc<CredentialStore>, json: bool) -> Result<()> {
    let cache_path = paths::usage_cache_path()?;
    let cache = match UsageCache::<ProviderUsage>::load(&cache_path) {
        Ok(cache) => cache,
        Err(err) => {
            tracing::warn!("Starting with an empty usage cache: {:#}", err);
            UsageCache::new()
        }
    };

    let providers = build_providers(config, store);
    let order: Vec<ProviderId> = providers.iter().map(|p| p.id()).collect();
    let orchestrator = FetchOrchestrator::new(Arc::new(cache));
    let fetched = orchestrator.fetch_all(&providers).await;

    if let Err(err) = orchestrator.cache().persist(&cache_path) {
        tracing::warn!("Failed to save usage cache: {:#}", err);
    }

    if json {
        let rendered = report::render_usage_json(&fetched);
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else if order.is_empty() {
        println!("No providers enabled.");
    } else {
        print!(
            "{}",
            report::render_usage_text(&fetched, &order, chrono::Utc::now())
        );
    }
    Ok(())
}

async fn run_accounts(config: &QuotaConfig, store: Arc<CredentialStore>, json: bool) -> Result<()> {
    let ctx = ProviderContext::new(
        store,
        HttpClient::new(config.http_timeout()),
        config.provider_timeout(codex::PROVIDER_ID),
    );
    let provider = CodexProvider::new(ctx);
    let accounts = tokio::task::spawn_blocking(move || provider.accounts())
        .await
        .context("Account discovery task failed")?
        .context("Failed to read Codex accounts")?;

    if json {
        let rendered = report::render_accounts_json(&accounts.merged, accounts.api_key_only);
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else {
        print!(
            "{}",
            report::render_accounts_text(&accounts.merged, accounts.api_key_only)
        );
    }
    Ok(())
}

async fn run_sources(store: Arc<CredentialStore>) -> Result<()> {
    let reports = tokio::task::spawn_blocking(move || {
        SecretKind::ALL
            .into_iter()
            .map(|kind| {
                if let Err(err) = store.resolve(kind) {
                    tracing::debug!("{}: {}", kind, err);
                }
                (kind, store.diagnostics(kind))
            })
            .collect::<Vec<_>>()
    })
    .await
    .context("Credential discovery task failed")?;

    print!("{}", report::render_sources_text(&reports));
    Ok(())
}
