use anyhow::Result;
use xiami_etl::{Config, XiamiClient};

pub async fn run_check(config: &Config) -> Result<()> {
    let client = XiamiClient::new(config)?;
    log::info!("Checking session for user {}", config.user_id);

    match client.check_session().await {
        Ok(()) => {
            println!("✓ Session accepted for user {}", config.user_id);
            Ok(())
        }
        Err(e) if e.is_auth_failure() => {
            println!("✗ Session rejected");
            Err(e.into())
        }
        Err(e) => {
            println!("✗ Check failed");
            Err(e.into())
        }
    }
}
