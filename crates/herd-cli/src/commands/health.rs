use herd_core::transport::{HttpTransport, Transport};

use crate::config::ClientConfig;
use crate::error::CliError;

pub async fn run_health(config: &ClientConfig) -> Result<(), CliError> {
    let transport = HttpTransport::new(&config.server_url, &config.token)?;
    let health = transport.health().await?;
    println!("{} ({})", health.status, health.timestamp);
    Ok(())
}

pub async fn run_reset(config: &ClientConfig, force: bool) -> Result<(), CliError> {
    if !force {
        return Err(CliError::Config(
            "reset wipes the server store for every device; pass --force to confirm".to_string(),
        ));
    }
    let transport = HttpTransport::new(&config.server_url, &config.token)?;
    let response = transport.reset().await?;
    println!("Server store wiped: {} todo(s) removed.", response.deleted.todos);
    Ok(())
}
