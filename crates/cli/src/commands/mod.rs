//! CLI subcommands.

pub mod migrate;
pub mod seed;
pub mod stats;

use thiserror::Error;

use dropshop_client::{Client, ClientConfig, ClientError, ConfigError};

/// Errors shared by commands that talk to the database.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connect using `DATABASE_URL` and friends.
pub async fn connect() -> Result<Client, CommandError> {
    let config = ClientConfig::from_env()?;
    tracing::info!("Connecting to database...");
    Ok(Client::connect(&config).await?)
}
