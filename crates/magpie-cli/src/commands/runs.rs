//! List recent sync runs.

use super::{get_database, resolve_user, short_id};
use anyhow::Result;
use colored::Colorize;
use magpie_config::Config;
use magpie_core::SyncStatus;

pub fn run(user: Option<String>, limit: i64) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;
    let user_id = resolve_user(&config, user);

    let runs = db.list_sync_runs(&user_id, Some(limit))?;
    if runs.is_empty() {
        println!(
            "{}",
            "No sync runs. Request one with 'magpie sync <integration>'.".dimmed()
        );
        return Ok(());
    }

    println!("{}", "Sync Runs".cyan().bold());
    println!("{}", "─".repeat(50));
    for run in &runs {
        let status = match run.status {
            SyncStatus::Completed => run.status.to_string().green(),
            SyncStatus::Failed => run.status.to_string().red(),
            SyncStatus::Started | SyncStatus::Processing => run.status.to_string().yellow(),
        };
        let finished = run
            .completed_at
            .map(|t| t.format(&config.ui.date_format).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} [{}] started {} finished {}",
            "•".dimmed(),
            short_id(&run.sync_id),
            status,
            run.created_at.format(&config.ui.date_format),
            finished
        );
        if let Some(ref error) = run.error_message {
            println!("    {}", error.dimmed());
        }
    }

    Ok(())
}
