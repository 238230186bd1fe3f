use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Group,
    Competitive,
}

impl Default for GameMode {
    fn default() -> Self {
        Self::Group
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub participant_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const CENTER: Vec2 = Vec2 { x: 0.5, y: 0.5 };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PuzzleView {
    pub focus: Vec2,
    pub zoom: f64,
}

/// Which character and which of its variants a puzzle shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRef {
    pub character_key: String,
    pub variant_num: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    pub reference: VariantRef,
    pub view: PuzzleView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessEvent {
    pub participant_id: String,
    pub display_name: String,
    pub character_key: String,
    pub at: i64,
    pub attempt_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solve {
    pub participant_id: String,
    pub at: i64,
    pub attempt_index: u32,
}

impl Solve {
    pub fn from_guess(guess: &GuessEvent) -> Self {
        Self {
            participant_id: guess.participant_id.clone(),
            at: guess.at,
            attempt_index: guess.attempt_index,
        }
    }
}

/// Bonus-round answer naming the variant once the character is solved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinGuess {
    pub participant_id: String,
    pub skin_name: String,
    pub at: i64,
    pub correct: bool,
    pub correct_skin_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puzzle: Option<Puzzle>,
    #[serde(default)]
    pub guesses: Vec<GuessEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solve: Option<Solve>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_guess: Option<SkinGuess>,
}

/// One participant's run through a competitive series. `guesses` and `solves`
/// are indexed by puzzle position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub participant_id: String,
    pub current_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_at: Option<i64>,
    #[serde(default)]
    pub guesses: Vec<Vec<GuessEvent>>,
    #[serde(default)]
    pub solves: Vec<Option<Solve>>,
}

impl PlayerProgress {
    pub fn new(participant_id: &str, puzzle_count: usize) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            current_index: 0,
            solved_at: None,
            guesses: vec![Vec::new(); puzzle_count],
            solves: vec![None; puzzle_count],
        }
    }

    pub fn reset(&mut self, puzzle_count: usize) {
        self.current_index = 0;
        self.solved_at = None;
        self.guesses = vec![Vec::new(); puzzle_count];
        self.solves = vec![None; puzzle_count];
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveRound {
    pub puzzles: Vec<Puzzle>,
    #[serde(default)]
    pub progress: BTreeMap<String, PlayerProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
}

/// Mode-specific half of a room, tagged by `mode` in the JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Round {
    Group(GroupRound),
    Competitive(CompetitiveRound),
}

impl Round {
    pub fn mode(&self) -> GameMode {
        match self {
            Round::Group(_) => GameMode::Group,
            Round::Competitive(_) => GameMode::Competitive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    pub group_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerInfo>,
    #[serde(flatten)]
    pub round: Round,
    pub created_at: i64,
    pub updated_at: i64,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub revision: u64,
}

impl Room {
    pub fn new(room_id: RoomId, round: Round, at: i64) -> Self {
        Self {
            group_id: room_id.group_id().to_string(),
            channel_id: room_id.channel_id().to_string(),
            room_id,
            players: BTreeMap::new(),
            round,
            created_at: at,
            updated_at: at,
            revision: 0,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.round.mode()
    }

    pub fn upsert_player(&mut self, participant_id: &str, display_name: &str) {
        self.players.insert(
            participant_id.to_string(),
            PlayerInfo {
                participant_id: participant_id.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }
}
