use anyhow::Result;
use xiami_core::model::Membership;
use xiami_etl::Config;

use super::open_database;

pub fn show_status(config: &Config) -> Result<()> {
    let db = open_database(config)?;

    println!("\n📊 Xiami Export Status\n");
    println!("  Database: {}", config.database_path().display());
    println!("  Schema version: {}", db.schema_version()?);

    let counts = db.count_by_status()?;
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    println!("\n  Songs: {total}");
    for (status, count) in &counts {
        println!("    {:<12} {count}", status.as_str());
    }

    println!("\n  Membership:");
    for (label, membership) in [
        ("songs", Membership::Songs),
        ("albums", Membership::Albums),
        ("playlists", Membership::Playlists),
    ] {
        println!("    {label:<12} {}", db.count_by_membership(membership)?);
    }

    if total == 0 {
        println!("\n  Run `xiami-exporter export songs` and `xiami-exporter db create-songs` first");
    }

    Ok(())
}
