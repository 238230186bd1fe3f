//! Splashdle room engine: reference catalog, puzzle generation, room storage,
//! event fan-out and the client-side game rules.

pub mod backend;
pub mod bus;
pub mod catalog;
pub mod db;
pub mod error;
pub mod game;
pub mod identity;
pub mod normalize;
pub mod puzzle;
pub mod service;
pub mod store;
pub mod stream;

pub use backend::Backend;
pub use bus::{EventBus, Listener, Subscription};
pub use catalog::{Catalog, CatalogCache, CatalogSource};
pub use error::{BusError, CatalogError, GameError, RoomError, StoreError};
pub use game::{Connectivity, GameMachine, GameSession, GameState, RoomTransport};
pub use identity::{CallerContext, ContextProvider};
pub use puzzle::PuzzleGenerator;
pub use service::RoomService;
pub use store::RoomRepository;
pub use stream::RoomStream;

use std::time::{SystemTime, UNIX_EPOCH};

/// Furthest-out (most cropped) zoom; every puzzle starts here.
pub const MAX_ZOOM: f64 = 3.0;
/// Floor for reveal steps caused by wrong guesses.
pub const MIN_ZOOM: f64 = 1.6;
pub const ZOOM_STEP: f64 = 0.25;
/// Zoom of a fully revealed image after a correct guess.
pub const REVEALED_ZOOM: f64 = 1.0;
pub const COMPETITIVE_PUZZLES: usize = 5;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}
