//! CLI command implementations.

pub mod config;
pub mod documents;
pub mod init;
pub mod integration;
pub mod retry;
pub mod runs;
pub mod status;
pub mod sync;
pub mod worker;

use anyhow::{Context, Result};
use magpie_config::{AppPaths, Config};
use magpie_core::Integration;
use magpie_db::Database;

/// Get the application paths.
pub fn get_paths() -> Result<AppPaths> {
    AppPaths::new().context("Failed to determine application directories")
}

/// Get a database connection, ensuring magpie is initialized.
pub fn get_database() -> Result<Database> {
    let paths = get_paths()?;

    if !paths.is_initialized() {
        anyhow::bail!("Magpie is not initialized. Run 'magpie init' first.");
    }

    Database::open(&paths.database_file).context("Failed to open database")
}

/// The user a command acts as: the flag if given, config default otherwise.
pub fn resolve_user(config: &Config, user: Option<String>) -> String {
    user.unwrap_or_else(|| config.general.default_user.clone())
}

/// Look up an integration by ID, falling back to an exact name match.
pub fn find_integration(db: &Database, user_id: &str, key: &str) -> Result<Integration> {
    if let Some(integration) = db.get_integration(user_id, key)? {
        return Ok(integration);
    }
    db.list_integrations(user_id)?
        .into_iter()
        .find(|i| i.name == key)
        .ok_or_else(|| anyhow::anyhow!("No integration '{}' for user '{}'", key, user_id))
}

/// Shorten an ID for display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
