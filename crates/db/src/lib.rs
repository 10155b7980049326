pub mod indexes;
pub mod models;

use homemic_config::DatabaseSettings;
use mongodb::{Client, Database};
use tracing::info;

/// Connects to MongoDB and returns a handle to the configured database.
pub async fn connect(settings: &DatabaseSettings) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_uri_str(&settings.url).await?;
    let db = client.database(&settings.name);
    info!(db = %settings.name, "Connected to MongoDB");
    Ok(db)
}
