use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use locale_sync::{Config, HttpProvider, Project, RunOptions, Runner};

/// Synchronize per-locale JSON documents with the source of truth and
/// translate missing or stale content via the configured provider.
#[derive(Parser, Debug)]
#[command(name = "locale-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project id from the projects config file
    #[arg(long, default_value = "site")]
    project: String,

    /// Locale tag to synchronize (repeatable); default: all enabled targets
    #[arg(short, long = "locale", value_name = "TAG")]
    locales: Vec<String>,

    /// Limit translation to specific blocks (comma-separated)
    #[arg(long, value_delimiter = ',')]
    blocks: Vec<String>,

    /// Compute diff and batches, estimate cost, but skip provider calls
    #[arg(long)]
    dry_run: bool,

    /// Compare document structures against the source without translating
    #[arg(long, conflicts_with = "dry_run")]
    verify_only: bool,

    /// Skip blocks already completed by a previous interrupted run
    #[arg(long)]
    resume: bool,

    /// Seed missing target documents with a copy of the source
    #[arg(long)]
    create_missing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("locale_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let project = Project::load(&config.projects_file, &cli.project)?;
    info!(
        "starting sync for project '{}' (source {})",
        project.id, project.source_locale
    );

    let provider = Arc::new(HttpProvider::new(&config)?);
    let runner = Runner::new(config, project, provider)?;

    let options = RunOptions {
        locales: cli.locales,
        blocks: cli.blocks,
        dry_run: cli.dry_run,
        verify_only: cli.verify_only,
        resume: cli.resume,
        create_missing: cli.create_missing,
    };

    let summary = runner.run(&options).await?;

    let synchronized = summary
        .reports
        .iter()
        .filter(|r| r.fully_synchronized())
        .count();
    info!(
        "done: {}/{} locales fully synchronized",
        synchronized,
        summary.reports.len()
    );
    Ok(())
}
