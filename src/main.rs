//! lastperson-rs: keeps a single "last person" record in a CloudKit private
//! database in sync with a local mirror.
//!
//! Talks to CloudKit Web Services with an API token and the signed-in user's
//! web auth token. Saves overwrite the server copy unconditionally; every
//! failure is classified and logged, then returned. Nothing is retried.

#![warn(clippy::all)]

mod cli;
mod config;
mod icloud;
mod readiness;
mod shutdown;
mod sync;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use icloud::{CloudKitDatabase, RecordStore};
use readiness::Readiness;
use sync::{FailureKind, RecordId, RecordSyncController};

/// Text shown for the current value; an empty mirror reads as "Nobody".
fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "Nobody"
    } else {
        name
    }
}

fn print_last_person(name: &str) {
    println!("The last person was {}!", display_name(name));
}

/// Run the show command.
///
/// A missing record is the normal state before the first save, so it prints
/// "Nobody" instead of failing.
async fn run_show(controller: &RecordSyncController) -> anyhow::Result<()> {
    match controller.refresh().await {
        Ok(()) => {}
        Err(e) if e.kind() == FailureKind::RecordNotFound => {}
        Err(e) => return Err(e.into()),
    }
    print_last_person(&controller.current_value());
    Ok(())
}

/// Run the check command.
async fn run_check(store: &dyn RecordStore) -> anyhow::Result<()> {
    let readiness = readiness::check_readiness(store).await;
    if let Some(hint) = readiness.hint() {
        println!("{hint}");
    }
    match readiness {
        Readiness::Ready { zones } => {
            println!("CloudKit private database is ready ({zones} zone(s)).");
            Ok(())
        }
        Readiness::Misconfigured(e) => Err(e).context("Container is not usable"),
        Readiness::SignInRequired(e) => Err(e).context("iCloud account is not usable"),
        Readiness::Unreachable(e) => Err(e).context("CloudKit is unreachable"),
    }
}

/// Run the probe command.
///
/// Always works on the test record: writes a random name, reads it back,
/// compares, then deletes the record again.
async fn run_probe(store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let controller = RecordSyncController::new(store, RecordId::for_testing(true));
    let random_name = uuid::Uuid::new_v4().to_string();

    controller
        .save(&random_name)
        .await
        .context("Probe write failed")?;
    controller.refresh().await.context("Probe read failed")?;
    let read_back = controller.current_value();

    controller.delete().await.context("Probe cleanup failed")?;

    if read_back != random_name {
        anyhow::bail!(
            "Written value '{}' does not match read value '{}'",
            random_name,
            read_back
        );
    }
    println!("Probe succeeded: wrote, read back and deleted {random_name}");
    Ok(())
}

/// Run the watch command until a shutdown signal arrives.
async fn run_watch(
    store: Arc<dyn RecordStore>,
    record_id: RecordId,
    interval: u64,
) -> anyhow::Result<()> {
    let shutdown_token = shutdown::install_signal_handler()?;

    let controller = RecordSyncController::create(store, record_id);
    controller.observe(|name| tracing::debug!(name, "Mirror updated"));
    let mut updates = controller.subscribe();

    // The initial refresh may already have landed before we subscribed.
    let mut last_printed = None::<String>;
    let current = updates.borrow_and_update().clone();
    if !current.is_empty() {
        print_last_person(&current);
        last_printed = Some(current);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    ticker.tick().await;

    tracing::info!(
        record = %controller.record_id(),
        interval,
        "Watching for changes"
    );
    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                tracing::info!("Shutdown requested, exiting...");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let name = updates.borrow_and_update().clone();
                if last_printed.as_deref() != Some(name.as_str()) {
                    print_last_person(&name);
                    last_printed = Some(name);
                }
            }
            _ = ticker.tick() => {
                // Failures are already logged by the classifier; keep watching.
                if controller.refresh().await.is_err() {
                    tracing::debug!("Refresh failed, will try again in {}s", interval);
                }
            }
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

    let config = config::Config::from_cli(&cli)?;
    tracing::debug!(?config, "Starting lastperson-rs");
    if config.web_auth_token.is_none() {
        tracing::warn!(
            "No web auth token configured; the private database requires a signed-in user"
        );
    }

    let store: Arc<dyn RecordStore> = Arc::new(CloudKitDatabase::from_config(&config)?);

    match cli.command {
        Command::Show => {
            let controller = RecordSyncController::new(store, config.record_id());
            run_show(&controller).await
        }
        Command::Save { name } => {
            let controller = RecordSyncController::new(store, config.record_id());
            controller.save(&name).await?;
            print_last_person(&controller.current_value());
            Ok(())
        }
        Command::Refresh => {
            let controller = RecordSyncController::new(store, config.record_id());
            controller.refresh().await?;
            print_last_person(&controller.current_value());
            Ok(())
        }
        Command::Delete => {
            let controller = RecordSyncController::new(store, config.record_id());
            controller.delete().await?;
            println!("Deleted record {}", controller.record_id());
            Ok(())
        }
        Command::Check => run_check(store.as_ref()).await,
        Command::Probe => run_probe(store).await,
        Command::Watch { interval } => {
            run_watch(store, config.record_id(), interval.max(1)).await
        }
    }
}
