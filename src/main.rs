//! icloud-mirror: incremental, resumable mirror of an iCloud Photos library.
//!
//! Lists the library through the CloudKit query API, downloads new items,
//! verifies existing files by SHA-256 and replaces only those whose content
//! changed. A resume cursor records the last committed item so an
//! interrupted run picks up where it stopped.

#![warn(clippy::all)]

mod cli;
mod config;
mod retry;
mod shutdown;
mod source;
mod state;
mod sync;
mod types;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use state::CursorStore;

/// Run the status command.
async fn run_status(args: cli::CursorArgs) -> anyhow::Result<()> {
    let path = args.cursor_path()?;
    let cursor = state::FileCursor::new(&path);

    println!("Cursor file: {}", cursor.path().display());
    match cursor.load().await? {
        Some(id) => println!("Last synced item: {}", id),
        None => println!("No cursor stored; the next sync starts from the beginning."),
    }
    Ok(())
}

/// Run the reset-cursor command.
async fn run_reset_cursor(args: cli::ResetCursorArgs) -> anyhow::Result<()> {
    let path = args.cursor.cursor_path()?;
    let cursor = state::FileCursor::new(&path);

    if cursor.load().await?.is_none() {
        println!("No cursor stored at {}", path.display());
        return Ok(());
    }

    if !args.yes {
        println!("This will delete the resume cursor at:");
        println!("  {}", path.display());
        println!("The next sync will verify every item in the library.");
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    cursor.clear().await?;
    println!("Resume cursor deleted.");
    Ok(())
}

/// Run the sync command, once or repeatedly in watch mode.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = config::Config::from_cli(args)?;
    tracing::info!(
        directory = %config.directory.display(),
        timezone = %config.timezone,
        "Starting icloud-mirror"
    );
    tracing::debug!(?config, "Resolved configuration");

    // Held until the function returns.
    let lock = if config.dry_run {
        None
    } else {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .with_context(|| format!("Failed to create {}", config.directory.display()))?;
        Some(state::RunLock::acquire(&config.lock_path()).await?)
    };
    if let Some(lock) = &lock {
        tracing::debug!("Holding run lock {}", lock.path().display());
    }

    let session_file = source::SessionFile::load(&config.session_file).await?;
    let http = source::HttpSession::new(
        &session_file,
        Duration::from_secs(config.http_timeout_secs),
    )?;

    let shutdown_token = shutdown::install_signal_handler()?;

    tracing::info!("Initializing photos service...");
    let library = match source::PhotoLibrary::open(
        Box::new(http),
        session_file.service_endpoint.clone(),
        session_file.params.clone(),
        config.date_source,
        &config.retry_config(),
        &shutdown_token,
    )
    .await
    {
        Ok(library) => library,
        Err(retry::RetryFailure::Cancelled) => {
            tracing::info!("Shutdown requested during startup, exiting...");
            return Ok(());
        }
        Err(retry::RetryFailure::Aborted(e)) if e.is_authentication() => {
            anyhow::bail!(
                "{}. Refresh {} and run again.",
                e,
                config.session_file.display()
            );
        }
        Err(e) => anyhow::bail!("Could not open the photo library: {}", e),
    };

    let sync_config = config.sync_config();
    let cursor = state::FileCursor::new(&config.cursor_file);
    let progress = sync::create_progress_sink(config.no_progress_bar);
    let engine = sync::SyncEngine::new(
        &sync_config,
        &library,
        &cursor,
        progress.as_ref(),
        sync::timestamp::default_timestamp_setter(),
    );

    loop {
        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }

        match engine.run(&shutdown_token).await {
            Ok(outcome) => {
                let stats = outcome.stats();
                if stats.failed > 0 {
                    tracing::warn!(
                        "{} items were skipped; the next run will retry them",
                        stats.failed
                    );
                }
                if let sync::SyncOutcome::Interrupted(_) = outcome {
                    tracing::info!(
                        "Sync interrupted; resume cursor kept at the last committed item"
                    );
                    break;
                }
            }
            Err(e) if e.is_authentication() => {
                anyhow::bail!(
                    "{}. Refresh {} and run again.",
                    e,
                    config.session_file.display()
                );
            }
            Err(e) if config.watch_with_interval.is_some() => {
                tracing::error!("Sync pass failed: {}", e);
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(interval) = config.watch_with_interval {
            tracing::info!("Waiting {} seconds...", interval);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Shutdown during wait, exiting...");
                    break;
                }
            }
        } else {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.effective_command() {
        Command::Status(args) => run_status(args).await,
        Command::ResetCursor(args) => run_reset_cursor(args).await,
        Command::Sync(args) => run_sync(args).await,
    }
}
