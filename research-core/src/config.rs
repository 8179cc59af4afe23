// research-core/src/config.rs
// Settings for the ingestion engine and its binaries

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ingestion {
    /// Ingest every recognized sheet right after a dataset is registered.
    pub auto_ingest: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: Database,
    pub ingestion: Ingestion,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("database.url", "sqlite:data/research.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.min_connections", 1)?
            .set_default("database.max_lifetime", 30)?
            .set_default("ingestion.auto_ingest", true)?
            .add_source(File::with_name("config").required(false))
            .build()?;

        s.try_deserialize()
    }

    pub fn get_db_url(&self) -> String {
        self.database.url.clone()
    }
}
