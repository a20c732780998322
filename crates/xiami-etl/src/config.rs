use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::category::FavCategory;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36";

/// Configuration for xiami-exporter.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (XME_* prefix)
/// 3. Config file (~/.config/xiami-exporter/config.toml)
/// 4. Built-in defaults (lowest priority)
///
/// One snapshot is loaded per run and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Numeric ID of the user whose favorites are exported.
    ///
    /// Can be set via:
    /// - ENV: XME_USER_ID
    /// - Config: user_id = 12345
    pub user_id: i64,

    /// Raw `Cookie` header copied from a logged-in browser session.
    ///
    /// Must contain `xm_sg_tk`, which signs every API request.
    pub cookie: Option<String>,

    /// Root directory for JSON pages, audio, covers and the database.
    ///
    /// Can be set via:
    /// - CLI: --dir /path/to/exports
    /// - ENV: XME_EXPORT_DIR
    /// - Default: ./XiamiExports
    pub export_dir: PathBuf,

    /// Database file name inside `export_dir`.
    pub database_name: String,

    pub base_url: String,

    pub user_agent: String,

    /// Items requested per page.
    pub page_size: u32,

    /// Minimum delay between two API requests.
    pub request_interval_ms: u64,

    pub request_timeout_secs: u64,

    /// Extra attempts for a failed audio or cover download.
    pub download_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: 0,
            cookie: None,
            export_dir: PathBuf::from("XiamiExports"),
            database_name: "db.sqlite3".to_string(),
            base_url: "https://www.xiami.com".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_size: 30,
            request_interval_ms: 1000,
            request_timeout_secs: 30,
            download_retries: 2,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/xiami-exporter/config.toml
    /// Reads environment variables with XME_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("xme");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// Load configuration with a custom export directory.
    ///
    /// This is used when the --dir CLI flag is provided.
    pub fn load_with_export_dir(export_dir: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.export_dir = export_dir;
        Ok(config)
    }

    /// Configuration rooted at `export_dir` with the given API base URL and
    /// no request pacing (for tests).
    #[must_use]
    pub fn for_testing(export_dir: &Path, base_url: &str) -> Self {
        Self {
            user_id: 1,
            cookie: Some("xm_sg_tk=0123456789abcdef_1609856909772; other=1".to_string()),
            export_dir: export_dir.to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_interval_ms: 0,
            request_timeout_secs: 5,
            download_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn json_dir(&self) -> PathBuf {
        self.export_dir.join("json")
    }

    /// Directory holding the page files of a favorites category.
    #[must_use]
    pub fn category_dir(&self, category: FavCategory) -> PathBuf {
        self.json_dir().join(category.dir_name())
    }

    #[must_use]
    pub fn album_details_dir(&self) -> PathBuf {
        self.json_dir().join("album_details")
    }

    #[must_use]
    pub fn playlist_details_dir(&self) -> PathBuf {
        self.json_dir().join("playlist_details")
    }

    #[must_use]
    pub fn music_dir(&self) -> PathBuf {
        self.export_dir.join("music")
    }

    #[must_use]
    pub fn covers_dir(&self) -> PathBuf {
        self.export_dir.join("covers")
    }

    #[must_use]
    pub fn artist_logos_dir(&self) -> PathBuf {
        self.export_dir.join("artist_logos")
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.export_dir.join(&self.database_name)
    }
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/xiami-exporter/config.toml
/// - macOS: ~/Library/Application Support/xiami-exporter/config.toml
/// - Windows: %APPDATA%\xiami-exporter\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xiami-exporter")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Xiami Exporter Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (XME_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Your numeric user ID (visible in the URL of your profile page)
#
# Can also be set via:
# - Environment: XME_USER_ID=12345
user_id = 0

# The Cookie header of a logged-in browser request to the site.
# Open the developer tools, copy any /api/ request and paste its cookie here.
# It must contain xm_sg_tk; re-capture it when requests report SG_TOKEN_EXPIRED.
#
# Can also be set via:
# - Environment: XME_COOKIE="xm_sg_tk=...; ..."
#cookie = "xm_sg_tk=...; xm_sg_tk.sig=..."

# Where JSON pages, music, covers and the database are written
#
# Can also be set via:
# - CLI: xiami-exporter --dir /custom/path export songs
# - Environment: XME_EXPORT_DIR=/custom/path
export_dir = "XiamiExports"

# Items per page when exporting favorites
page_size = 30

# Minimum delay between API requests, in milliseconds
request_interval_ms = 1000

# Per-request timeout, in seconds
request_timeout_secs = 30

# Extra attempts for a failed audio or cover download
download_retries = 2
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
