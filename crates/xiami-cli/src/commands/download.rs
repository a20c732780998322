use anyhow::Result;
use xiami_core::model::DownloadStatus;
use xiami_etl::download::{ArtSummary, DownloadSummary};
use xiami_etl::{Config, Downloader, FileStore, XiamiClient};

use super::open_database;

fn print_art(kind: &str, summary: &ArtSummary) {
    println!("\n✓ {kind} done");
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Existing:   {}", summary.skipped);
    println!("  Failed:     {}", summary.failed);
}

fn print_songs(summary: &DownloadSummary) {
    println!("\n✓ Download run finished");
    println!("  Success:     {}", summary.success);
    println!("  Unavailable: {}", summary.unavailable);
    println!("  Failed:      {}", summary.failed);
    if summary.missing > 0 {
        println!("  Not in database: {}", summary.missing);
    }
    if summary.failed > 0 {
        println!("\nRetry with: xiami-exporter download music --filter-status failed");
    }
}

pub async fn run_download_music(
    config: &Config,
    song_ids: &[i64],
    filter_status: DownloadStatus,
    batch_size: usize,
    batch_count: usize,
) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let db = open_database(config)?;
    let downloader = Downloader::new(&client, &db, config);

    let summary = if song_ids.is_empty() {
        log::info!("Downloading songs with status {filter_status}");
        downloader
            .download_batches(filter_status, batch_size, batch_count)
            .await?
    } else {
        log::info!("Downloading {} requested songs", song_ids.len());
        downloader.download_by_ids(song_ids).await?
    };

    print_songs(&summary);
    Ok(())
}

pub async fn run_download_covers(config: &Config) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let db = open_database(config)?;
    let store = FileStore::new(config);

    let summary = Downloader::new(&client, &db, config)
        .download_covers(&store)
        .await?;

    print_art("Album covers", &summary);
    Ok(())
}

pub async fn run_download_artist_logos(config: &Config) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let db = open_database(config)?;
    let store = FileStore::new(config);

    let summary = Downloader::new(&client, &db, config)
        .download_artist_logos(&store)
        .await?;

    print_art("Artist logos", &summary);
    Ok(())
}
