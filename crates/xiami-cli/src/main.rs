use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use xiami_core::model::DownloadStatus;
use xiami_etl::{Config, EtlError, FavCategory};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "xiami-exporter", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Export directory (default: export_dir from the config, ./XiamiExports)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Verify the configured session cookie with one signed request
    Check,
    /// Export favorites and list details as JSON
    ///
    /// Pages are written to json/<category>/<category>-<page>.json under the
    /// export directory as they arrive. Re-running overwrites pages in place;
    /// detail exports skip lists already on disk, so an interrupted run can
    /// simply be started again.
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },
    /// Load exported JSON into the song database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Download audio, album covers or artist logos
    Download {
        #[command(subcommand)]
        target: DownloadTarget,
    },
    /// Write metadata and cover art into downloaded audio files
    ///
    /// Every song with download status "success" is looked up in music/ as
    /// <row_number>-<id>.mp3 or .m4a. Files without a matching song are
    /// ignored.
    Tag,
    /// Show song counts per download status and list membership
    Status,
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file if it does not exist
    Init,
    /// Set a value in the config file
    Set { key: String, value: String },
}

#[derive(Debug, clap::Subcommand)]
enum ExportTarget {
    /// Favorite songs
    Songs {
        /// Export only this page
        #[arg(long, short)]
        page: Option<u32>,
    },
    /// Favorite albums
    Albums {
        #[arg(long, short)]
        page: Option<u32>,
    },
    /// Favorite artists
    Artists {
        #[arg(long, short)]
        page: Option<u32>,
    },
    /// Favorite playlists
    Playlists {
        #[arg(long, short)]
        page: Option<u32>,
    },
    /// Playlists created by the user
    MyPlaylists {
        #[arg(long, short)]
        page: Option<u32>,
    },
    /// Detail (with songs) of every exported favorite album
    AlbumDetails,
    /// Detail (with songs) of every exported playlist
    PlaylistDetails {
        /// Use the user's own playlists instead of favorited ones
        #[arg(long)]
        mine: bool,
    },
}

#[derive(Debug, clap::Subcommand)]
enum DbAction {
    /// Create songs from the exported favorite songs pages
    CreateSongs {
        /// Delete all songs and list memberships first
        #[arg(long)]
        reset: bool,
    },
    /// Add songs and memberships from exported album details
    IngestAlbums,
    /// Add songs and memberships from exported playlist details
    IngestPlaylists,
}

#[derive(Debug, clap::Subcommand)]
enum DownloadTarget {
    /// Download audio files
    Music {
        /// Only these song IDs (comma separated); backup IDs are not tried
        #[arg(long, short = 'i', value_delimiter = ',')]
        song_id: Vec<i64>,

        /// Download songs with this status (not-set, success, unavailable,
        /// failed, or the numeric code)
        #[arg(long, default_value = "not-set", allow_hyphen_values = true)]
        filter_status: DownloadStatus,

        /// Songs per play-info request
        #[arg(long, default_value_t = 10)]
        batch_size: usize,

        /// Stop after this many batches (0 for no limit)
        #[arg(long, default_value_t = 0)]
        batch_count: usize,
    },
    /// Download album covers
    Covers,
    /// Download artist logos
    ArtistLogos,
}

impl ExportTarget {
    fn category(&self) -> Option<(FavCategory, Option<u32>)> {
        match *self {
            Self::Songs { page } => Some((FavCategory::Songs, page)),
            Self::Albums { page } => Some((FavCategory::Albums, page)),
            Self::Artists { page } => Some((FavCategory::Artists, page)),
            Self::Playlists { page } => Some((FavCategory::Playlists, page)),
            Self::MyPlaylists { page } => Some((FavCategory::MyPlaylists, page)),
            Self::AlbumDetails | Self::PlaylistDetails { .. } => None,
        }
    }
}

fn load_config(dir: Option<PathBuf>) -> Result<Config> {
    match dir {
        Some(dir) => Config::load_with_export_dir(dir),
        None => Config::load(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(cli.dir),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
            ConfigAction::Set { key, value } => commands::config::set_config(key, value),
        };
    }

    let config = load_config(cli.dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Check => commands::check::run_check(&config).await?,
        Commands::Export { target } => match target.category() {
            Some((category, page)) => commands::export::run_export_pages(&config, category, page).await?,
            None => match target {
                ExportTarget::PlaylistDetails { mine } => {
                    commands::export::run_export_playlist_details(&config, mine).await?;
                }
                _ => commands::export::run_export_album_details(&config).await?,
            },
        },
        Commands::Db { action } => match action {
            DbAction::CreateSongs { reset } => commands::db::run_create_songs(&config, reset)?,
            DbAction::IngestAlbums => commands::db::run_ingest_albums(&config)?,
            DbAction::IngestPlaylists => commands::db::run_ingest_playlists(&config)?,
        },
        Commands::Download { target } => match target {
            DownloadTarget::Music {
                song_id,
                filter_status,
                batch_size,
                batch_count,
            } => {
                commands::download::run_download_music(
                    &config,
                    &song_id,
                    filter_status,
                    batch_size,
                    batch_count,
                )
                .await?;
            }
            DownloadTarget::Covers => commands::download::run_download_covers(&config).await?,
            DownloadTarget::ArtistLogos => {
                commands::download::run_download_artist_logos(&config).await?;
            }
        },
        Commands::Tag => commands::tag::run_tag(&config)?,
        Commands::Status => commands::status::show_status(&config)?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = &result {
        let auth_failure = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<EtlError>())
            .any(EtlError::is_auth_failure);
        if auth_failure {
            eprintln!("The session was rejected. Copy a fresh Cookie header from a logged-in");
            eprintln!("browser request and run: xiami-exporter config set cookie '<cookie>'");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_music() {
        let cli = Cli::parse_from([
            "xiami-exporter",
            "--dir",
            "/tmp/x",
            "download",
            "music",
            "--song-id",
            "1,2",
            "--filter-status",
            "-9",
        ]);
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Download {
                target:
                    DownloadTarget::Music {
                        song_id,
                        filter_status,
                        batch_size,
                        batch_count,
                    },
            } => {
                assert_eq!(song_id, vec![1, 2]);
                assert_eq!(filter_status, DownloadStatus::Failed);
                assert_eq!(batch_size, 10);
                assert_eq!(batch_count, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_export_page() {
        let cli = Cli::parse_from(["xiami-exporter", "export", "my-playlists", "--page", "3"]);
        match cli.command {
            Commands::Export { target } => {
                assert_eq!(target.category(), Some((FavCategory::MyPlaylists, Some(3))));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
