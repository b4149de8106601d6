//! Configuration commands.

use super::get_paths;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn show() -> Result<()> {
    let paths = get_paths()?;

    if !paths.config_file.exists() {
        anyhow::bail!("Config file not found. Run 'magpie init' first.");
    }

    let contents =
        std::fs::read_to_string(&paths.config_file).context("Failed to read config file")?;

    println!("{}", "Current Configuration".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("{}", contents);

    Ok(())
}

pub fn path() -> Result<()> {
    let paths = get_paths()?;
    println!("{}", paths.config_file.display());
    Ok(())
}
