//! airq - sync and analyse Breathe London air-quality data.
//!
//! Run with: `cargo run -p airq-cli -- --help`

use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use airq_cli::commands::{
    SiteEdit, cmd_breaches, cmd_config_init, cmd_last_time, cmd_outliers, cmd_read,
    cmd_site, cmd_site_average, cmd_sites, cmd_sync, cmd_sync_all, cmd_sync_sites, cmd_wrapped,
};
use airq_cli::config::{MAX_CONCURRENCY, default_config_path};
use airq_cli::{Cli, Commands, Config, ConfigAction};
use airq_core::{BreatheLondon, SharedStore, SyncEngine};
use airq_store::{AggregateQuery, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    // Runs before loading, since the file may not exist yet
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = cli.command
    {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        let path = cmd_config_init(&path, force)?;
        return print(&serde_json::json!({ "config": path }), cli.compact);
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(db_path) = cli.database.clone() {
        config.storage.path = db_path;
    }
    if let Some(key) = cli.api_key.clone() {
        config.remote.api_key = Some(key);
    }
    config.validate()?;

    info!("Opening database at {:?}", config.storage.path);
    let store: SharedStore = Arc::new(Mutex::new(
        Store::open(&config.storage.path).context("Failed to open database")?,
    ));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current job");
            on_signal.cancel();
        }
    });

    run(cli, config, store, cancel).await
}

async fn run(cli: Cli, config: Config, store: SharedStore, cancel: CancellationToken) -> Result<()> {
    let compact = cli.compact;
    let now = OffsetDateTime::now_utc();

    match cli.command {
        Commands::SyncSites => {
            let engine = engine(&config, store, cancel, &cli.command)?;
            let count = cmd_sync_sites(&engine).await?;
            print(&serde_json::json!({ "sites": count }), compact)
        }
        Commands::Sync {
            ref site,
            series,
            resync,
        } => {
            let engine = engine(&config, store, cancel, &cli.command)?;
            print(&cmd_sync(&engine, site, series, resync).await?, compact)
        }
        Commands::SyncAll {
            resync,
            ref start,
            concurrency,
            stop_on_error,
        } => {
            let mut options = config.sync.options();
            if let Some(concurrency) = concurrency {
                ensure!(
                    (1..=MAX_CONCURRENCY).contains(&concurrency),
                    "concurrency must be between 1 and {MAX_CONCURRENCY}"
                );
                options.concurrency = concurrency;
            }
            options.stop_on_error |= stop_on_error;

            let engine = engine(&config, store, cancel, &cli.command)?.with_options(options);
            let output = cmd_sync_all(&engine, resync, start.as_deref()).await?;
            print(&output, compact)?;

            if output.report.cancelled {
                bail!("Sync cancelled; resume with --start");
            }
            if !output.report.failed.is_empty() {
                bail!("{} sync jobs failed", output.report.failed.len());
            }
            Ok(())
        }
        Commands::Outliers { series, threshold } => {
            let blocks = cmd_outliers(store, config.thresholds, series, threshold).await?;
            print(&blocks, compact)
        }
        Commands::Sites { source } => print(&cmd_sites(&store, source).await?, compact),
        Commands::Read {
            series,
            bucket,
            ref sites,
            ref classifications,
            ref range,
        } => {
            let range = range.resolve(now)?;
            let mut query = AggregateQuery::new(series)
                .bucket(bucket)
                .since(range.start)
                .until(range.end);
            for code in sites {
                query = query.site_code(code);
            }
            for classification in classifications {
                query = query.classification(*classification);
            }
            print(&cmd_read(&store, &query).await?, compact)
        }
        Commands::SiteAverage { series, ref range } => {
            let range = range.resolve(now)?;
            print(&cmd_site_average(&store, series, range).await?, compact)
        }
        Commands::Breaches {
            series,
            limit,
            ref range,
        } => {
            let range = range.resolve(now)?;
            let limit = limit.unwrap_or_else(|| config.limits.get(series));
            print(&cmd_breaches(&store, series, range, limit).await?, compact)
        }
        Commands::LastTime { ref site, series } => {
            print(&cmd_last_time(&store, site, series).await?, compact)
        }
        Commands::Site {
            ref site,
            enable,
            disable,
            status,
            clear_status,
        } => {
            let edit = SiteEdit {
                enabled: (enable || disable).then_some(enable),
                status: if clear_status { Some(None) } else { status.map(Some) },
            };
            print(&cmd_site(&store, site, edit).await?, compact)
        }
        Commands::Wrapped { year } => {
            print(&cmd_wrapped(&store, year, &config.limits).await?, compact)
        }
        Commands::Config { .. } => bail!("config commands run before the database is opened"),
    }
}

fn engine(
    config: &Config,
    store: SharedStore,
    cancel: CancellationToken,
    command: &Commands,
) -> Result<SyncEngine<BreatheLondon, SharedStore>> {
    if config.remote.api_key.is_none() {
        warn!("No API key configured; requests are likely to be rejected");
    }

    let remote = BreatheLondon::new(config.remote.client_config())
        .context("Failed to create API client")?
        .with_cancellation(cancel.clone());

    tracing::debug!("Running {:?} against {}", command, remote.base_url());
    Ok(SyncEngine::new(remote, store).with_cancellation(cancel))
}

fn print<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
            .add_directive("hyper=info".parse()?)
            .add_directive("reqwest=info".parse()?)
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("warn")
                .add_directive("airq_cli=info".parse()?)
                .add_directive("airq_core=info".parse()?)
                .add_directive("airq_store=info".parse()?),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
