mod event;
mod requests;
mod room;
mod room_id;

pub use event::RoomEvent;
pub use requests::{CallerFields, GuessRequest, JoinRequest, PuzzleRequest};
pub use room::{
    CompetitiveRound, GameMode, GroupRound, GuessEvent, PlayerInfo, PlayerProgress, Puzzle,
    PuzzleView, Room, Round, SkinGuess, Solve, VariantRef, Vec2,
};
pub use room_id::{RoomId, RoomIdError};

/// Namespace shared by persisted room records and their event channels.
pub const ROOM_KEY_PREFIX: &str = "splashdle:room:";
pub const EVENTS_SUFFIX: &str = ":events";

pub mod paths {
    pub const JOIN: &str = "/api/rooms/join";
    pub const GUESS: &str = "/api/rooms/guess";
    pub const PUZZLE: &str = "/api/rooms/puzzle";
    pub const STREAM: &str = "/api/rooms/stream";
    pub const RANDOM_PUZZLE: &str = "/api/puzzle/random";
}
