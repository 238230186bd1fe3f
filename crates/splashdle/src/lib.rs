//! Umbrella crate for Splashdle.
//!
//! Re-exports the engine and protocol crates so embedders (a bot, a desktop
//! shell, a test harness) can depend on the single name `splashdle`.

pub use splashdle_engine as engine;
pub use splashdle_protocol as protocol;
