//! Re-enqueue sync work: a single run, or all failed queue messages.

use super::{get_database, resolve_user, short_id};
use anyhow::{Context, Result};
use colored::Colorize;
use magpie_config::Config;
use magpie_core::{QueueTransport, SyncMessage, SyncStatus};
use magpie_db::SqliteQueue;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

pub fn run(sync_id: Option<String>, failed: bool, user: Option<String>) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;

    if failed {
        let count = db.retry_failed()?;
        if count == 0 {
            println!("{}", "No failed queue messages.".dimmed());
        } else {
            println!(
                "{} Returned {} failed queue message(s) to pending",
                "✓".green(),
                count
            );
        }
        return Ok(());
    }

    let sync_id = sync_id.ok_or_else(|| anyhow::anyhow!("Provide a sync run ID, or --failed"))?;
    let user_id = resolve_user(&config, user);

    let run = db
        .get_sync_run(&user_id, &sync_id)?
        .ok_or_else(|| anyhow::anyhow!("No sync run '{}' for user '{}'", sync_id, user_id))?;

    if run.status == SyncStatus::Completed {
        println!(
            "{} Sync {} already completed, nothing to retry.",
            "Note:".yellow().bold(),
            short_id(&sync_id)
        );
        return Ok(());
    }

    let parsed = Uuid::parse_str(&run.sync_id).context("Sync run has a malformed id")?;
    let message = SyncMessage::new(&user_id, parsed);

    let queue = Arc::new(SqliteQueue::new(db));
    let rt = Runtime::new().context("Failed to create async runtime")?;
    rt.block_on(queue.publish(&message))?;

    println!(
        "{} Re-enqueued sync {} (was {})",
        "✓".green(),
        short_id(&run.sync_id),
        run.status
    );

    Ok(())
}
