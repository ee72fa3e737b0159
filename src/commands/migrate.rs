//! Schema setup

use anyhow::{Context, Result};

use crate::config::Config;
use crate::storage::SqliteRowStore;

/// Create the database file and its tables if missing
pub fn migrate(config: &Config) -> Result<()> {
    let path = &config.database.sqlite_path;
    SqliteRowStore::new(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    tracing::info!(path = %path.display(), "schema ready");
    println!("Database ready at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.sqlite_path = dir.path().join("nested/rotor.db");

        migrate(&config).unwrap();
        assert!(config.database.sqlite_path.exists());
        // idempotent
        migrate(&config).unwrap();
    }
}
