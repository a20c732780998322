use anyhow::Result;
use xiami_etl::tag::tag_songs;
use xiami_etl::{Config, FileStore};

use super::open_database;

pub fn run_tag(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let store = FileStore::new(config);
    let music_dir = config.music_dir();

    println!("Tagging audio files in {}...", music_dir.display());
    let summary = tag_songs(&db, &store, &music_dir)?;

    println!("\n✓ Tagged {} files ({} with cover art)", summary.tagged, summary.with_cover);
    if summary.missing > 0 {
        println!("  {} downloaded songs have no file in music/", summary.missing);
    }
    if summary.failed > 0 {
        println!("  {} files could not be tagged (see log)", summary.failed);
    }

    Ok(())
}
