use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open the index database at `path`.
///
/// Read-write pools create the file (and its parent directory) if missing.
/// Read-only pools fail if the file does not exist. The default rollback
/// journal is used so a finished index is a single self-contained file.
pub async fn connect(path: &Path, read_only: bool) -> Result<SqlitePool> {
    if !read_only {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .journal_mode(SqliteJournalMode::Delete)
        .read_only(read_only)
        .create_if_missing(!read_only);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database {}", path.display()))?;

    Ok(pool)
}
