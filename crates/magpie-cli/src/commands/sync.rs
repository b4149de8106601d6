//! Request a sync and enqueue it.

use super::{find_integration, get_database, resolve_user, short_id};
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use magpie_config::Config;
use magpie_core::{MessagePriority, QueueTransport, SyncMessage, SyncStatus};
use magpie_db::{SqliteQueue, SqliteStore};
use magpie_sync::{ProcessorRegistry, SyncCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use uuid::Uuid;

pub fn run(integration_key: &str, user: Option<String>, priority: &str, wait: bool) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;
    let user_id = resolve_user(&config, user);

    let priority = MessagePriority::from_str(priority)
        .ok_or_else(|| anyhow::anyhow!("Unknown priority '{}' (use normal or high)", priority))?;

    let integration = find_integration(&db, &user_id, integration_key)?;

    let store = Arc::new(SqliteStore::new(db.clone()));
    let queue = Arc::new(SqliteQueue::new(db.clone()));
    // Only `request` is called here; dispatch happens in the worker, so the
    // registry stays empty.
    let coordinator = SyncCoordinator::new(
        store.clone(),
        store.clone(),
        Arc::new(ProcessorRegistry::new()),
    );

    let rt = Runtime::new().context("Failed to create async runtime")?;
    let latest = db.latest_sync_run(&user_id, &integration.id)?;
    let run = rt.block_on(coordinator.request(&user_id, &integration.id))?;
    let reused = latest.map(|l| l.sync_id == run.sync_id).unwrap_or(false);

    if reused {
        println!(
            "{} Sync {} already in flight for '{}'",
            "Note:".yellow().bold(),
            short_id(&run.sync_id),
            integration.name
        );
    } else {
        let sync_id = Uuid::parse_str(&run.sync_id).context("Sync run has a malformed id")?;
        let message = SyncMessage::new(&user_id, sync_id).with_priority(priority);
        rt.block_on(queue.publish(&message))?;
        println!(
            "{} Enqueued {} sync {} for '{}'",
            "✓".green(),
            priority,
            short_id(&run.sync_id),
            integration.name
        );
    }

    if wait {
        wait_for_completion(&rt, &db, &user_id, &run.sync_id)?;
    } else {
        println!(
            "  Check progress with: {}",
            "magpie runs".cyan()
        );
    }

    Ok(())
}

fn wait_for_completion(
    rt: &Runtime,
    db: &magpie_db::Database,
    user_id: &str,
    sync_id: &str,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Syncing {}", short_id(sync_id)));
    pb.enable_steady_tick(Duration::from_millis(100));

    loop {
        let run = db
            .get_sync_run(user_id, sync_id)?
            .ok_or_else(|| anyhow::anyhow!("Sync run {} disappeared", sync_id))?;

        match run.status {
            SyncStatus::Completed => {
                pb.finish_with_message(format!(
                    "{} Sync {} completed",
                    "✓".green().bold(),
                    short_id(sync_id)
                ));
                return Ok(());
            }
            SyncStatus::Failed => {
                pb.finish_and_clear();
                anyhow::bail!(
                    "Sync {} failed: {}",
                    short_id(sync_id),
                    run.error_message.unwrap_or_else(|| "unknown error".into())
                );
            }
            SyncStatus::Started | SyncStatus::Processing => {
                rt.block_on(tokio::time::sleep(Duration::from_millis(500)));
            }
        }
    }
}
