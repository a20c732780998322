use anyhow::Result;
use xiami_etl::reconcile::{self, IngestSummary};
use xiami_etl::{Config, FileStore};

use super::open_database;

fn print_summary(summary: &IngestSummary) {
    println!("  New songs:       {}", summary.created);
    println!("  Already present: {}", summary.flagged);
    if summary.skipped > 0 {
        println!("  Skipped:         {} (see log)", summary.skipped);
    }
}

pub fn run_create_songs(config: &Config, reset: bool) -> Result<()> {
    let mut db = open_database(config)?;
    let store = FileStore::new(config);

    let summary = reconcile::create_songs_db(&mut db, &store, reset)?;

    println!("\n✓ Loaded favorite songs into {}", config.database_path().display());
    print_summary(&summary);

    Ok(())
}

pub fn run_ingest_albums(config: &Config) -> Result<()> {
    let mut db = open_database(config)?;
    let store = FileStore::new(config);

    let summary = reconcile::ingest_album_details(&mut db, &store)?;

    println!("\n✓ Ingested {} album details", summary.lists);
    print_summary(&summary);

    Ok(())
}

pub fn run_ingest_playlists(config: &Config) -> Result<()> {
    let mut db = open_database(config)?;
    let store = FileStore::new(config);

    let summary = reconcile::ingest_playlist_details(&mut db, &store)?;

    println!("\n✓ Ingested {} playlist details", summary.lists);
    print_summary(&summary);

    Ok(())
}
