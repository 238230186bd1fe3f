use std::sync::Arc;

use clap::Parser;
use splashdle_engine::{CatalogCache, PuzzleGenerator, RoomService};
use splashdle_server::{AppState, Config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "splashdle_server=info,splashdle_engine=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let backend = config.backend();
    tracing::info!(backend = backend.name(), addr = %config.addr, "starting splashdle server");

    let catalog = Arc::new(CatalogCache::new(config.catalog_source()));
    let (rooms, bus) = backend.build();
    let service = RoomService::new(rooms, bus, PuzzleGenerator::new(catalog.clone()));

    // Warm the catalog so the first join can generate a puzzle. Joins and the
    // random puzzle endpoint retry a failed load.
    let preload = catalog.clone();
    tokio::spawn(async move {
        let _ = preload.ensure_loaded().await;
    });

    let state = AppState::new(service, catalog).with_allowed_origins(config.allow_origins.clone());
    splashdle_server::serve(config.addr, state).await
}
