//! Status command - queue, workers, runs, LLM reachability.

use super::{get_database, short_id};
use anyhow::{Context, Result};
use colored::Colorize;
use magpie_config::Config;
use magpie_core::QueueStatus;
use magpie_llm::LlmClient;
use tokio::runtime::Runtime;

pub fn run() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;

    println!("{}", "Magpie Status".cyan().bold());
    println!("{}", "─".repeat(50));

    let (pending, processing, done, failed) = db.queue_counts()?;
    println!();
    println!("{}", "Sync Queue".white().bold());
    println!("  {} Pending: {}", "○".yellow(), pending);
    println!("  {} Processing: {}", "◐".blue(), processing);
    println!("  {} Done: {}", "●".green(), done);
    if failed > 0 {
        println!("  {} Failed: {}", "✗".red(), failed);

        let failed_items = db.list_queue(Some(QueueStatus::Failed))?;
        for item in failed_items.iter().take(3) {
            println!(
                "    {} {} (attempt {})",
                "✗".red(),
                short_id(&item.id),
                item.attempts
            );
            if let Some(ref error) = item.error {
                println!("      {}", error.dimmed());
            }
        }
        if failed_items.len() > 3 {
            println!("    ...and {} more", failed_items.len() - 3);
        }
        println!(
            "    Requeue them with: {}",
            "magpie retry --failed".cyan()
        );
    }

    let workers = db.list_worker_health()?;
    println!();
    println!("{}", "Workers".white().bold());
    if workers.is_empty() {
        println!(
            "  {}",
            "No workers running. Start one with 'magpie worker'.".dimmed()
        );
    } else {
        for worker in &workers {
            let age = chrono::Utc::now() - worker.last_seen;
            let liveness = if age.num_seconds() < 30 {
                "alive".green()
            } else {
                format!("stale ({}s)", age.num_seconds()).red()
            };
            println!(
                "  {} {} - {} processed, {} errors [{}]",
                "•".dimmed(),
                worker.worker_id,
                worker.processed,
                worker.errors,
                liveness
            );
        }
    }

    let runs = db.list_sync_runs(&config.general.default_user, Some(5))?;
    if !runs.is_empty() {
        println!();
        println!("{}", "Recent Sync Runs".white().bold());
        for run in &runs {
            println!(
                "  {} {} [{}] {}",
                "•".dimmed(),
                short_id(&run.sync_id),
                run.status,
                run.created_at.format(&config.ui.date_format)
            );
            if let Some(ref error) = run.error_message {
                println!("    {}", error.dimmed());
            }
        }
    }

    let stats = db.get_stats()?;
    println!();
    println!("{}", "Knowledge Base".white().bold());
    println!(
        "  {} documents ({} completed, {} failed), {} chunks",
        stats.total_documents, stats.completed_documents, stats.failed_documents, stats.total_chunks
    );
    println!(
        "  {} graph nodes, {} relationships",
        stats.graph_nodes, stats.graph_relationships
    );

    println!();
    if db.integrity_check()? {
        println!("{} Database integrity OK", "✓".green());
    } else {
        println!("{} Database integrity check FAILED", "✗".red().bold());
    }

    let rt = Runtime::new().context("Failed to create async runtime")?;
    let llm_ok = match LlmClient::from_config(&config.llm) {
        Ok(client) => rt.block_on(client.is_available()),
        Err(_) => false,
    };
    println!();
    if llm_ok {
        println!(
            "{} LLM reachable at {} ({})",
            "✓".green(),
            config.llm.host,
            config.llm.model
        );
    } else {
        println!(
            "{} LLM not reachable at {} - entity extraction will fail",
            "✗".red(),
            config.llm.host
        );
    }

    Ok(())
}
