//! Feedsync - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use feedsync::config::Config;
use feedsync::exporter::{CsvExporter, Exporter, SqlExporter};
use feedsync::feed::{registry, FeedSource};
use feedsync::orchestrator::SyncOrchestrator;
use feedsync::report::ReportExporter;
use feedsync::status::ExportStatus;
use feedsync::{Cli, Commands, SyncError};
use feedsync_common::logging::{init_logging, LogConfig};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let log_config = LogConfig::builder().level(level).log_file_prefix("feedsync").build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring logging environment: {}", e);
        LogConfig::builder().level(level).build()
    });

    // Keep the guard so file output is flushed on exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = run(&cli).await {
        error!(error = %format!("{:#}", e), "command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if cli.command == Commands::Feeds {
        list_feeds();
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if !cli.tables.is_empty() {
        config.export.tables = cli.tables.clone();
    }

    tokio::fs::create_dir_all(&config.export.path)
        .await
        .context("Failed to create the export directory")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match cli.command {
        Commands::Sql => {
            let exporter = SqlExporter::connect(&config.sql_config()?)
                .await
                .context("Failed to connect to the database")?;
            sync(&config, Arc::new(exporter), cancel).await
        },
        Commands::Csv => {
            let exporter = CsvExporter::new(&config.export.path, config.csv.max_rows_per_file)
                .await
                .context("Failed to prepare the CSV export directory")?;
            sync(&config, Arc::new(exporter), cancel).await
        },
        Commands::Reports => reports(&config, cancel).await,
        Commands::Feeds => Ok(()),
    }
}

async fn sync(config: &Config, exporter: Arc<dyn Exporter>, cancel: CancellationToken) -> Result<()> {
    let selection = registry::select(&config.export.tables);
    info!(feeds = selection.len(), "starting sync");

    let orchestrator = SyncOrchestrator::new(
        config.api_client()?,
        config.sheqsy_scope()?,
        exporter,
        Arc::new(ExportStatus::new()),
        config.feed_options()?,
    )
    .with_pool_size(config.export.pool_size)
    .with_cancellation(cancel);

    let summary = orchestrator.run(&selection).await?;
    for warning in &summary.warnings {
        warn!(warning = %warning, "feed skipped");
    }
    println!(
        "Exported {} rows across {} feeds in {:.1}s",
        summary.rows,
        summary.feeds_completed,
        summary.duration.as_secs_f64()
    );
    Ok(())
}

async fn reports(config: &Config, cancel: CancellationToken) -> Result<()> {
    let client = config.api_client()?.ok_or(SyncError::NoApiTokens)?;
    let db = SqlExporter::connect(&config.sql_config()?)
        .await
        .context("Failed to connect to the database")?;
    let exporter = ReportExporter::new(client, Arc::new(db), config.report_config()?)?;
    let options = config.feed_options()?;
    let status = ExportStatus::new();

    let summary = tokio::select! {
        _ = cancel.cancelled() => return Err(SyncError::Cancelled.into()),
        summary = exporter.export_all(options, &status) => summary?,
    };

    println!(
        "Downloaded {} PDF and {} WORD reports ({} inspections unchanged)",
        summary.pdf_reports, summary.word_reports, summary.no_change
    );
    summary.ensure_success()?;
    Ok(())
}

fn list_feeds() {
    for feed in registry::all() {
        let source = match feed.source {
            FeedSource::Paginated(path) => path.to_string(),
            FeedSource::Sheqsy(resource) | FeedSource::SheqsyHistory(resource) => {
                format!("sheqsy/{}", resource)
            },
        };
        println!("{:<24} {:<28} {:?}", feed.name, source, feed.refresh);
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    warn!("interrupt received, stopping after running feeds finish");
    cancel.cancel();
}
