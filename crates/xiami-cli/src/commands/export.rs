use anyhow::Result;
use xiami_etl::{Config, Exporter, FavCategory, FileStore, XiamiClient};

pub async fn run_export_pages(config: &Config, category: FavCategory, page: Option<u32>) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let store = FileStore::new(config);

    match page {
        Some(page) => println!("Exporting {category} page {page}..."),
        None => println!("Exporting all {category} pages..."),
    }

    let summary = Exporter::new(&client, &store).export_pages(category, page).await?;

    println!(
        "\n✓ Exported {} records in {} pages to {}",
        summary.records,
        summary.pages,
        config.category_dir(category).display()
    );

    Ok(())
}

pub async fn run_export_album_details(config: &Config) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let store = FileStore::new(config);

    println!("Exporting album details...");
    let summary = Exporter::new(&client, &store).export_album_details().await?;

    println!(
        "\n✓ Fetched {} albums ({} already exported)",
        summary.fetched, summary.skipped
    );
    println!("Run 'xiami-exporter db ingest-albums' to add their songs");

    Ok(())
}

pub async fn run_export_playlist_details(config: &Config, mine: bool) -> Result<()> {
    let client = XiamiClient::new(config)?;
    let store = FileStore::new(config);

    let source = if mine { "your own" } else { "favorite" };
    println!("Exporting details of {source} playlists...");
    let summary = Exporter::new(&client, &store)
        .export_playlist_details(mine)
        .await?;

    println!(
        "\n✓ Fetched {} playlists ({} already exported)",
        summary.fetched, summary.skipped
    );
    println!("Run 'xiami-exporter db ingest-playlists' to add their songs");

    Ok(())
}
