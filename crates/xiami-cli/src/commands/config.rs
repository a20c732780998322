use anyhow::{Context, Result};
use std::path::PathBuf;
use toml_edit::{value, DocumentMut};
use xiami_etl::{config, Config};

const STRING_KEYS: &[&str] = &["cookie", "export_dir", "database_name", "base_url", "user_agent"];
const INTEGER_KEYS: &[&str] = &[
    "user_id",
    "page_size",
    "request_interval_ms",
    "request_timeout_secs",
    "download_retries",
];

/// The first 12 characters of the cookie header, plus its length.
fn mask_cookie(cookie: &str) -> String {
    let shown: String = cookie.chars().take(12).collect();
    if shown.len() < cookie.len() {
        format!("{shown}… ({} chars)", cookie.chars().count())
    } else {
        shown
    }
}

/// Show the current effective configuration.
pub fn show_config(dir: Option<PathBuf>) -> Result<()> {
    let config = match dir {
        Some(dir) => Config::load_with_export_dir(dir)?,
        None => Config::load()?,
    };

    println!("Current Configuration");
    println!("=====================\n");

    let config_path = config::config_file_path();
    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  user_id: {}", config.user_id);
    println!(
        "  cookie: {}",
        config.cookie.as_deref().map_or_else(|| "<not set>".to_string(), mask_cookie)
    );
    println!("  export_dir: {}", config.export_dir.display());
    println!("  database: {}", config.database_path().display());
    println!("  base_url: {}", config.base_url);
    println!("  page_size: {}", config.page_size);
    println!("  request_interval_ms: {}", config.request_interval_ms);
    println!("  request_timeout_secs: {}", config.request_timeout_secs);
    println!("  download_retries: {}", config.download_retries);

    println!("\nPriority: CLI args > ENV vars (XME_*) > Config file > Defaults");

    Ok(())
}

/// Apply `key = value` to a config document, keeping its comments and layout.
fn set_key(contents: &str, key: &str, raw: &str) -> Result<String> {
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Failed to parse config file")?;

    if STRING_KEYS.contains(&key) {
        doc[key] = value(raw);
    } else if INTEGER_KEYS.contains(&key) {
        let number: i64 = raw
            .parse()
            .with_context(|| format!("{key} must be an integer, got '{raw}'"))?;
        doc[key] = value(number);
    } else {
        anyhow::bail!(
            "Unknown config key: {}\n\nValid keys: {}, {}",
            key,
            STRING_KEYS.join(", "),
            INTEGER_KEYS.join(", ")
        );
    }

    Ok(doc.to_string())
}

/// Set a config value.
pub fn set_config(key: &str, raw: &str) -> Result<()> {
    let config_path = config::config_file_path();
    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let updated = set_key(&contents, key, raw)?;
    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    let shown = if key == "cookie" { mask_cookie(raw) } else { raw.to_string() };
    println!("✓ Updated {} = {}", key, shown);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nSet user_id and cookie, then run 'xiami-exporter check'.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
