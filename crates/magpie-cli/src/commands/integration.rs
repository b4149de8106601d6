//! Integration management commands.

use super::{get_database, resolve_user, short_id};
use anyhow::Result;
use colored::Colorize;
use magpie_config::Config;
use magpie_core::{Integration, IntegrationKind};

pub fn add(
    name: &str,
    kind: &str,
    path: Option<String>,
    table: Option<String>,
    ignore: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;
    let user_id = resolve_user(&config, user);

    let kind = IntegrationKind::from_str(kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown integration kind '{}'", kind))?;

    match kind {
        IntegrationKind::Drive | IntegrationKind::Sqlite if path.is_none() => {
            anyhow::bail!("--path is required for {} integrations", kind);
        }
        IntegrationKind::Sqlite if table.is_none() => {
            anyhow::bail!("--table is required for sqlite integrations");
        }
        _ => {}
    }

    let mut integration = Integration::new(&user_id, kind, name);
    if let Some(path) = path {
        integration = integration.with_setting("path", path);
    }
    if let Some(table) = table {
        integration = integration.with_setting("table", table);
    }
    if let Some(ignore) = ignore {
        integration = integration.with_setting("ignore", ignore);
    }

    db.create_integration(&integration)?;

    println!(
        "{} Added {} integration '{}' ({})",
        "✓".green(),
        kind,
        integration.name,
        short_id(&integration.id)
    );
    println!("  Sync it with: {}", format!("magpie sync {}", name).cyan());

    Ok(())
}

pub fn list(user: Option<String>) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;
    let user_id = resolve_user(&config, user);

    let integrations = db.list_integrations(&user_id)?;
    if integrations.is_empty() {
        println!(
            "{}",
            "No integrations. Add one with 'magpie integration add'.".dimmed()
        );
        return Ok(());
    }

    println!("{}", "Integrations".cyan().bold());
    println!("{}", "─".repeat(50));
    for integration in &integrations {
        let active = if integration.is_active {
            "active".green()
        } else {
            "inactive".red()
        };
        println!(
            "  {} {} [{}] ({}) {}",
            "•".dimmed(),
            integration.name.bold(),
            integration.kind,
            short_id(&integration.id),
            active
        );
        if let Some(checkpoint) = integration.checkpoint() {
            println!("    checkpoint: {}", checkpoint.dimmed());
        }
    }

    Ok(())
}
