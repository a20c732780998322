pub mod check;
pub mod config;
pub mod db;
pub mod download;
pub mod export;
pub mod status;
pub mod tag;

use anyhow::{Context, Result};
use xiami_core::schema::Database;
use xiami_etl::Config;

/// Open the export database, creating the export directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    std::fs::create_dir_all(&config.export_dir).with_context(|| {
        format!(
            "Failed to create export directory {}",
            config.export_dir.display()
        )
    })?;
    let path = config.database_path();
    Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}
