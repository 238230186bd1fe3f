use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use splashdle_engine::backend::Backend;
use splashdle_engine::catalog::{CatalogSource, DataDragonSource, FileSource, DEFAULT_DATA_DRAGON_URL};
use splashdle_engine::db::Db;

/// Process configuration. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "splashdle-server", about = "Shared rooms for splashdle")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "SPLASHDLE_ADDR", default_value = "127.0.0.1:39333")]
    pub addr: SocketAddr,

    /// SQLite file shared by every server process. Without it rooms live in
    /// this process only.
    #[arg(long, env = "SPLASHDLE_DB")]
    pub db_path: Option<PathBuf>,

    /// Local `championFull.json` to use instead of the network.
    #[arg(long, env = "SPLASHDLE_CATALOG")]
    pub catalog_file: Option<PathBuf>,

    #[arg(long, env = "SPLASHDLE_CATALOG_URL", default_value = DEFAULT_DATA_DRAGON_URL)]
    pub catalog_url: String,

    /// Extra browser origin allowed to call the API; repeatable.
    #[arg(long = "allow-origin", env = "SPLASHDLE_ALLOW_ORIGINS", value_delimiter = ',')]
    pub allow_origins: Vec<String>,

    /// How often a durable-mode process checks for events from its peers.
    #[arg(long, env = "SPLASHDLE_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn backend(&self) -> Backend {
        match &self.db_path {
            Some(path) => Backend::Durable {
                db: Db::new(path.clone()),
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            },
            None => Backend::Ephemeral,
        }
    }

    pub fn catalog_source(&self) -> Arc<dyn CatalogSource> {
        match &self.catalog_file {
            Some(path) => Arc::new(FileSource::new(path.clone())),
            None => Arc::new(DataDragonSource::new(self.catalog_url.clone())),
        }
    }
}
