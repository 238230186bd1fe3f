//! Client-side game rules.
//!
//! [`GameMachine`] owns the local view of one room and folds guesses,
//! puzzles and snapshots into it. It never does I/O; [`GameSession`] drives
//! it against a transport (online) or purely locally (offline), so both
//! modes share one set of zoom and solve rules.

mod http;
mod session;
mod transport;

pub use http::HttpTransport;
pub use session::{Connectivity, GameSession};
pub use transport::{InProcessTransport, RoomTransport};

use splashdle_protocol::{
    CompetitiveRound, GameMode, GroupRound, GuessEvent, PlayerInfo, PlayerProgress, Puzzle,
    PuzzleView, Room, RoomEvent, Round, SkinGuess, Solve, Vec2,
};

use crate::catalog::Catalog;
use crate::normalize::skin_name_matches;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rules {
    pub max_zoom: f64,
    pub min_zoom: f64,
    pub zoom_step: f64,
    pub revealed_zoom: f64,
    pub competitive_puzzles: usize,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            max_zoom: crate::MAX_ZOOM,
            min_zoom: crate::MIN_ZOOM,
            zoom_step: crate::ZOOM_STEP,
            revealed_zoom: crate::REVEALED_ZOOM,
            competitive_puzzles: crate::COMPETITIVE_PUZZLES,
        }
    }
}

impl Rules {
    /// One reveal step, floored at `min_zoom`. A view already at or below
    /// the floor (e.g. fully revealed) is left alone.
    pub fn step_down(&self, zoom: f64) -> f64 {
        if zoom <= self.min_zoom {
            return zoom;
        }
        (zoom - self.zoom_step).clamp(self.min_zoom, self.max_zoom)
    }

    fn revealed(&self) -> PuzzleView {
        PuzzleView {
            focus: Vec2::CENTER,
            zoom: self.revealed_zoom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Offline,
    Connecting,
    Online,
}

/// What the UI should show; derived from [`GameState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePanel {
    Lobby,
    Group,
    Competitive,
    Results,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameState {
    Lobby {
        preferred_mode: GameMode,
        player: Option<PlayerInfo>,
    },
    Group {
        connection: ConnectionStatus,
        room: Room,
    },
    Competitive {
        connection: ConnectionStatus,
        room: Room,
        participant_id: String,
    },
    Results {
        mode: GameMode,
        last_puzzle: Option<Puzzle>,
        last_solve_at: Option<i64>,
    },
    Error {
        message: String,
    },
}

impl GameState {
    fn lobby(preferred_mode: GameMode) -> Self {
        Self::Lobby {
            preferred_mode,
            player: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameMachine {
    rules: Rules,
    state: GameState,
}

impl Default for GameMachine {
    fn default() -> Self {
        Self::new(Rules::default())
    }
}

impl GameMachine {
    pub fn new(rules: Rules) -> Self {
        Self {
            rules,
            state: GameState::lobby(GameMode::Group),
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn panel(&self) -> GamePanel {
        match &self.state {
            GameState::Lobby { .. } => GamePanel::Lobby,
            GameState::Group { .. } => GamePanel::Group,
            GameState::Competitive { room, .. } => match &room.round {
                Round::Competitive(round) if round.winner_id.is_some() => GamePanel::Results,
                Round::Competitive(_) | Round::Group(_) => GamePanel::Competitive,
            },
            GameState::Results { .. } => GamePanel::Results,
            GameState::Error { .. } => GamePanel::Error,
        }
    }

    pub fn room(&self) -> Option<&Room> {
        match &self.state {
            GameState::Group { room, .. } | GameState::Competitive { room, .. } => Some(room),
            _ => None,
        }
    }

    /// The lobby's chosen player, if any.
    pub fn player(&self) -> Option<&PlayerInfo> {
        match &self.state {
            GameState::Lobby { player, .. } => player.as_ref(),
            _ => None,
        }
    }

    pub fn go_lobby(&mut self, preferred_mode: GameMode) {
        self.state = GameState::lobby(preferred_mode);
    }

    /// Only meaningful in the lobby; ignored elsewhere.
    pub fn set_player(&mut self, info: PlayerInfo) {
        if let GameState::Lobby { player, .. } = &mut self.state {
            *player = Some(info);
        }
    }

    /// Shows `room` as the active group round, re-deriving its view from the
    /// recorded guesses.
    pub fn enter_group(&mut self, room: Room, connection: ConnectionStatus) {
        self.state = GameState::Group {
            connection,
            room: derive_room(room, &self.rules),
        };
    }

    pub fn enter_competitive(&mut self, room: Room, participant_id: &str) {
        self.state = GameState::Competitive {
            connection: ConnectionStatus::Offline,
            room,
            participant_id: participant_id.to_string(),
        };
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        match &mut self.state {
            GameState::Group { connection, .. } | GameState::Competitive { connection, .. } => {
                *connection = status;
            }
            _ => {}
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = GameState::Error {
            message: message.into(),
        };
    }

    pub fn apply_event(&mut self, event: &RoomEvent) {
        match event {
            RoomEvent::Init(None) => {}
            RoomEvent::Init(Some(room)) | RoomEvent::RoomUpdated(room) => self.apply_snapshot(room),
            RoomEvent::Guess(guess) => self.apply_guess(guess.clone()),
            RoomEvent::Puzzle(puzzle) => self.apply_puzzle(puzzle.clone()),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &Room) {
        let GameState::Group { room, .. } = &mut self.state else {
            return;
        };
        if snapshot.room_id != room.room_id || snapshot.mode() != GameMode::Group {
            return;
        }
        let mut next = derive_room(snapshot.clone(), &self.rules);
        if let (Round::Group(old), Round::Group(new)) = (&room.round, &mut next.round) {
            let same_puzzle = old.puzzle.as_ref().map(|p| &p.reference)
                == new.puzzle.as_ref().map(|p| &p.reference);
            if new.skin_guess.is_none() && same_puzzle {
                new.skin_guess = old.skin_guess.clone();
            }
        }
        *room = next;
    }

    /// Folds one guess into the active round. Duplicate deliveries are
    /// ignored.
    pub fn apply_guess(&mut self, guess: GuessEvent) {
        let rules = self.rules;
        let (GameState::Group { room, .. } | GameState::Competitive { room, .. }) = &mut self.state
        else {
            return;
        };
        let applied = match &mut room.round {
            Round::Group(round) => fold_group_guess(round, &guess, &rules),
            Round::Competitive(round) => fold_competitive_guess(round, &guess, &rules),
        };
        if applied {
            room.upsert_player(&guess.participant_id, &guess.display_name);
            room.updated_at = room.updated_at.max(guess.at);
        }
    }

    /// A new group puzzle resets the round. Re-delivery of the current puzzle
    /// is a no-op.
    pub fn apply_puzzle(&mut self, puzzle: Puzzle) {
        let GameState::Group { room, .. } = &mut self.state else {
            return;
        };
        let Round::Group(round) = &mut room.round else {
            return;
        };
        if round.puzzle.as_ref() == Some(&puzzle) {
            return;
        }
        *round = GroupRound {
            puzzle: Some(puzzle),
            ..GroupRound::default()
        };
    }

    /// Attempt index the next local guess by `participant_id` would get.
    pub fn next_attempt_index(&self, participant_id: &str) -> u32 {
        let len = match self.room().map(|room| &room.round) {
            Some(Round::Group(round)) => round.guesses.len(),
            Some(Round::Competitive(round)) => round
                .progress
                .get(participant_id)
                .and_then(|p| p.guesses.get(p.current_index))
                .map_or(0, Vec::len),
            None => 0,
        };
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    /// The puzzle the local player is currently looking at.
    pub fn current_puzzle(&self) -> Option<&Puzzle> {
        match &self.state {
            GameState::Group { room, .. } => match &room.round {
                Round::Group(round) => round.puzzle.as_ref(),
                Round::Competitive(_) => None,
            },
            GameState::Competitive {
                room,
                participant_id,
                ..
            } => match &room.round {
                Round::Competitive(round) => round.puzzles.get(current_index(round, participant_id)),
                Round::Group(_) => None,
            },
            _ => None,
        }
    }

    /// Manual hint: zoom out one step on the puzzle being viewed.
    pub fn reveal_more(&mut self, at: i64) {
        let rules = self.rules;
        let room = match &mut self.state {
            GameState::Group { room, .. } => {
                let Round::Group(GroupRound {
                    puzzle: Some(puzzle),
                    ..
                }) = &mut room.round
                else {
                    return;
                };
                puzzle.view.zoom = rules.step_down(puzzle.view.zoom);
                room
            }
            GameState::Competitive {
                room,
                participant_id,
                ..
            } => {
                let Round::Competitive(round) = &mut room.round else {
                    return;
                };
                let index = current_index(round, participant_id);
                let Some(puzzle) = round.puzzles.get_mut(index) else {
                    return;
                };
                puzzle.view.zoom = rules.step_down(puzzle.view.zoom);
                room
            }
            _ => return,
        };
        room.updated_at = room.updated_at.max(at);
    }

    /// Bonus round, allowed once the group puzzle is solved. Returns the
    /// recorded answer.
    pub fn submit_skin_guess(
        &mut self,
        participant_id: &str,
        skin_name: &str,
        catalog: Option<&Catalog>,
        at: i64,
    ) -> Option<SkinGuess> {
        let GameState::Group { room, .. } = &mut self.state else {
            return None;
        };
        let Round::Group(round) = &mut room.round else {
            return None;
        };
        let (Some(puzzle), Some(_)) = (&round.puzzle, &round.solve) else {
            return None;
        };
        let correct_skin_name = catalog
            .and_then(|c| c.variant_name(&puzzle.reference.character_key, puzzle.reference.variant_num))
            .unwrap_or("Unknown")
            .to_string();
        let skin_name = skin_name.trim().to_string();
        let guess = SkinGuess {
            participant_id: participant_id.to_string(),
            correct: skin_name_matches(&skin_name, &correct_skin_name),
            skin_name,
            at,
            correct_skin_name,
        };
        round.skin_guess = Some(guess.clone());
        room.updated_at = room.updated_at.max(at);
        Some(guess)
    }

    /// Swaps in a fresh competitive series: progress is reset for every
    /// known player and the winner cleared.
    pub fn new_series(&mut self, puzzles: Vec<Puzzle>, at: i64) {
        let GameState::Competitive { room, .. } = &mut self.state else {
            return;
        };
        let Round::Competitive(round) = &mut room.round else {
            return;
        };
        for progress in round.progress.values_mut() {
            progress.reset(puzzles.len());
        }
        round.puzzles = puzzles;
        round.winner_id = None;
        room.updated_at = room.updated_at.max(at);
    }

    pub fn finish_to_results(&mut self) {
        let next = match &self.state {
            GameState::Group { room, .. } => match &room.round {
                Round::Group(round) => GameState::Results {
                    mode: GameMode::Group,
                    last_puzzle: round.puzzle.clone(),
                    last_solve_at: round.solve.as_ref().map(|s| s.at),
                },
                Round::Competitive(_) => return,
            },
            GameState::Competitive {
                room,
                participant_id,
                ..
            } => match &room.round {
                Round::Competitive(round) => {
                    let index = current_index(round, participant_id);
                    GameState::Results {
                        mode: GameMode::Competitive,
                        last_puzzle: round.puzzles.get(index).or(round.puzzles.last()).cloned(),
                        last_solve_at: round.progress.get(participant_id).and_then(|p| p.solved_at),
                    }
                }
                Round::Group(_) => return,
            },
            _ => return,
        };
        self.state = next;
    }
}

fn current_index(round: &CompetitiveRound, participant_id: &str) -> usize {
    round
        .progress
        .get(participant_id)
        .map_or(0, |p| p.current_index)
}

fn same_guess(a: &GuessEvent, b: &GuessEvent) -> bool {
    a.attempt_index == b.attempt_index && a.participant_id == b.participant_id && a.at == b.at
}

/// Rebuilds a room's view from its recorded guesses, as if each had arrived
/// live against the stored starting view.
pub fn derive_room(mut room: Room, rules: &Rules) -> Room {
    match &mut room.round {
        Round::Group(round) => {
            let guesses = std::mem::take(&mut round.guesses);
            round.solve = None;
            for guess in &guesses {
                fold_group_guess(round, guess, rules);
            }
        }
        Round::Competitive(_) => {}
    }
    room
}

/// Returns false when the guess was already folded in.
fn fold_group_guess(round: &mut GroupRound, guess: &GuessEvent, rules: &Rules) -> bool {
    if round.guesses.iter().any(|g| same_guess(g, guess)) {
        return false;
    }
    if let (Some(puzzle), None) = (round.puzzle.as_mut(), &round.solve) {
        if guess.character_key == puzzle.reference.character_key {
            puzzle.view = rules.revealed();
            round.solve = Some(Solve::from_guess(guess));
        } else {
            puzzle.view.zoom = rules.step_down(puzzle.view.zoom);
        }
    }
    round.guesses.push(guess.clone());
    true
}

fn fold_competitive_guess(round: &mut CompetitiveRound, guess: &GuessEvent, rules: &Rules) -> bool {
    let count = round.puzzles.len();
    let progress = round
        .progress
        .entry(guess.participant_id.clone())
        .or_insert_with(|| PlayerProgress::new(&guess.participant_id, count));
    let index = progress.current_index;
    if index >= count {
        return false;
    }
    if progress.guesses.len() < count {
        progress.guesses.resize(count, Vec::new());
    }
    if progress.solves.len() < count {
        progress.solves.resize(count, None);
    }
    if progress.guesses[index].iter().any(|g| same_guess(g, guess)) {
        return false;
    }

    progress.guesses[index].push(guess.clone());
    let puzzle = &mut round.puzzles[index];
    if guess.character_key == puzzle.reference.character_key {
        progress.solves[index] = Some(Solve::from_guess(guess));
        progress.current_index += 1;
        if progress.current_index == count {
            progress.solved_at = Some(guess.at);
            if round.winner_id.is_none() {
                round.winner_id = Some(guess.participant_id.clone());
            }
        }
    } else {
        puzzle.view.zoom = rules.step_down(puzzle.view.zoom);
    }
    true
}
