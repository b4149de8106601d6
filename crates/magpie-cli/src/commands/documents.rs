//! List documents and their pipeline state.

use super::{get_database, resolve_user, short_id};
use anyhow::Result;
use colored::Colorize;
use magpie_config::Config;
use magpie_core::ProcessingStatus;

pub fn run(user: Option<String>, failed_only: bool, limit: i64) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;
    let user_id = resolve_user(&config, user);

    let filter = failed_only.then_some(ProcessingStatus::Failed);
    let documents = db.list_documents(&user_id, filter, Some(limit))?;
    if documents.is_empty() {
        println!("{}", "No documents.".dimmed());
        return Ok(());
    }

    println!("{}", "Documents".cyan().bold());
    println!("{}", "─".repeat(50));
    for document in &documents {
        let processing = match document.processing_status {
            ProcessingStatus::Success => document.processing_status.to_string().green(),
            ProcessingStatus::Failed => document.processing_status.to_string().red(),
            ProcessingStatus::Processing => document.processing_status.to_string().yellow(),
        };
        println!(
            "  {} {} ({}) [{} / {}]",
            "•".dimmed(),
            document.title.bold(),
            short_id(&document.id),
            document.status,
            processing
        );
        if let Some(ref error) = document.error {
            println!("    {}", error.dimmed());
        }
    }

    Ok(())
}
