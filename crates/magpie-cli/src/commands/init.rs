//! Initialize Magpie.

use super::get_paths;
use anyhow::{Context, Result};
use colored::Colorize;
use magpie_config::Config;
use magpie_db::Database;

pub fn run() -> Result<()> {
    let paths = get_paths()?;

    if paths.is_initialized() {
        println!("{} Magpie is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Database: {}", paths.database_file.display());
        return Ok(());
    }

    println!("{}", "Initializing Magpie...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    println!("  {} Created directories", "✓".green());

    Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
    println!(
        "  {} Created config: {}",
        "✓".green(),
        paths.config_file.display()
    );

    let _db = Database::open(&paths.database_file).context("Failed to initialize database")?;
    println!(
        "  {} Created database: {}",
        "✓".green(),
        paths.database_file.display()
    );

    println!();
    println!("{}", "Magpie initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  1. Add an integration: {}",
        "magpie integration add notes --kind drive --path ~/Documents/notes".cyan()
    );
    println!("  2. Start the worker: {}", "magpie worker".cyan());
    println!("  3. Request a sync: {}", "magpie sync notes".cyan());

    Ok(())
}
