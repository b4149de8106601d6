//! Local drive source
//!
//! Treats a directory tree as a drive-style integration. The checkpoint is
//! the RFC3339 timestamp of the newest file seen; files modified after it
//! are listed for ingestion.

use crate::error::{ExtractError, ExtractResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glob::Pattern;
use magpie_core::{Error, ExternalFile, FileSource, Integration, Result, SourceListing};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lists files under the integration's `path` setting.
///
/// Settings:
/// - `path` (required): root directory to scan
/// - `ignore` (optional): comma-separated glob patterns matched against
///   paths relative to the root
pub struct DriveSource;

#[async_trait]
impl FileSource for DriveSource {
    async fn list_files(
        &self,
        integration: &Integration,
        checkpoint: Option<&str>,
    ) -> Result<SourceListing> {
        let root = integration
            .settings
            .get("path")
            .ok_or_else(|| ExtractError::MissingSetting("path".to_string()))?
            .clone();
        let ignore = parse_ignore_patterns(
            integration
                .settings
                .get("ignore")
                .map(|s| s.as_str())
                .unwrap_or(""),
        );
        let since = checkpoint.and_then(parse_checkpoint);

        let listing = tokio::task::spawn_blocking(move || scan_directory(&root, &ignore, since))
            .await
            .map_err(|e| Error::Other(format!("blocking task failed: {}", e)))??;
        Ok(listing)
    }
}

fn scan_directory(
    root: &str,
    ignore: &[Pattern],
    since: Option<DateTime<Utc>>,
) -> ExtractResult<SourceListing> {
    let root_path = Path::new(root);
    if !root_path.is_dir() {
        return Err(ExtractError::FileNotFound(root_path.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut newest: Option<DateTime<Utc>> = None;

    for entry in WalkDir::new(root_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root_path) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if is_hidden(relative) || ignore.iter().any(|p| p.matches(&relative_str)) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        // The checkpoint advances over every eligible file, listed or not.
        if newest.map_or(true, |n| modified > n) {
            newest = Some(modified);
        }

        if let Some(since) = since {
            if modified <= since {
                continue;
            }
        }

        files.push(
            ExternalFile::new(
                relative_str,
                entry.file_name().to_string_lossy(),
                entry.path().to_string_lossy(),
            )
            .with_modified_at(modified)
            .with_size(metadata.len() as i64),
        );
    }

    files.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    debug!(root = %root, count = files.len(), "drive listing complete");
    Ok(SourceListing {
        files,
        checkpoint: newest.map(|n| n.to_rfc3339()),
    })
}

fn parse_checkpoint(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_ignore_patterns(raw: &str) -> Vec<Pattern> {
    raw.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}

fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}
