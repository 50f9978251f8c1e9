//! Database migration command.
//!
//! Migrations are embedded from `crates/client/migrations/`:
//!
//! ```text
//! migrations/
//! ├── 20261019000001_create_users.sql
//! ├── 20261019000002_create_drops.sql
//! └── ...
//! ```

use super::{CommandError, connect};

/// Apply every pending migration.
///
/// # Errors
///
/// Returns `CommandError` if `DATABASE_URL` is missing or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let client = connect().await?;

    tracing::info!("Running migrations...");
    client.migrate().await?;
    client.disconnect().await;

    tracing::info!("Migrations complete!");
    Ok(())
}
