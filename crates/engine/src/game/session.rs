use std::sync::Arc;

use splashdle_protocol::{
    CompetitiveRound, GameMode, GroupRound, GuessEvent, PlayerInfo, PlayerProgress, Puzzle, Room,
    RoomEvent, RoomId, Round, SkinGuess,
};

use super::transport::RoomTransport;
use super::{ConnectionStatus, GameMachine, GamePanel, GameState, Rules};
use crate::catalog::CatalogCache;
use crate::error::GameError;
use crate::identity::{CallerContext, ContextProvider};
use crate::normalize::normalize_character_key;
use crate::now_ms;
use crate::puzzle::PuzzleGenerator;
use crate::stream::RoomStream;

const LOCAL_GROUP: &str = "local";
const LOCAL_CHANNEL: &str = "voice";
const LOCAL_PARTICIPANT: &str = "local-player";
const LOCAL_DISPLAY_NAME: &str = "Player";

#[derive(Clone)]
pub enum Connectivity {
    /// Everything happens on the local machine; nothing is shared.
    Offline,
    /// Mutations go through the transport and come back as room events.
    Online(Arc<dyn RoomTransport>),
}

/// One player's game: the state machine plus whatever it needs to act.
///
/// Failed actions leave the machine in the error state and also return the
/// error so the caller can log it.
pub struct GameSession {
    machine: GameMachine,
    connectivity: Connectivity,
    identity: Arc<dyn ContextProvider>,
    catalog: Arc<CatalogCache>,
    puzzles: PuzzleGenerator,
    feed: Option<RoomStream>,
    caller: Option<CallerContext>,
    player: PlayerInfo,
}

impl GameSession {
    pub fn new(
        connectivity: Connectivity,
        identity: Arc<dyn ContextProvider>,
        catalog: Arc<CatalogCache>,
    ) -> Self {
        Self::with_rules(connectivity, identity, catalog, Rules::default())
    }

    pub fn with_rules(
        connectivity: Connectivity,
        identity: Arc<dyn ContextProvider>,
        catalog: Arc<CatalogCache>,
        rules: Rules,
    ) -> Self {
        Self {
            machine: GameMachine::new(rules),
            connectivity,
            identity,
            puzzles: PuzzleGenerator::new(catalog.clone()),
            catalog,
            feed: None,
            caller: None,
            player: PlayerInfo {
                participant_id: LOCAL_PARTICIPANT.to_string(),
                display_name: LOCAL_DISPLAY_NAME.to_string(),
            },
        }
    }

    pub fn machine(&self) -> &GameMachine {
        &self.machine
    }

    pub fn state(&self) -> &GameState {
        self.machine.state()
    }

    pub fn panel(&self) -> GamePanel {
        self.machine.panel()
    }

    pub fn player(&self) -> &PlayerInfo {
        &self.player
    }

    pub fn go_lobby(&mut self, preferred_mode: GameMode) {
        self.release();
        self.machine.go_lobby(preferred_mode);
    }

    pub fn set_player(&mut self, info: PlayerInfo) {
        self.machine.set_player(info);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.release();
        self.machine.fail(message);
    }

    pub async fn start_group(&mut self) -> Result<(), GameError> {
        let result = self.start_group_inner().await;
        self.settle(result)
    }

    async fn start_group_inner(&mut self) -> Result<(), GameError> {
        self.release();
        match self.transport() {
            Some(transport) => {
                let caller = self.identity.current_context().ok_or(GameError::MissingContext)?;
                let room_id = caller.room_id().map_err(|_| GameError::MissingContext)?;
                self.adopt_player(Some(&caller));
                let shell = self.shell(room_id, group_round(None));
                self.machine.enter_group(shell, ConnectionStatus::Connecting);

                // A missing catalog is not fatal here: the room may already
                // have a puzzle, or the server may generate one.
                let puzzle = self.fresh_puzzle().await.ok();
                let room = transport.join(&caller, puzzle).await?;
                let feed = transport.subscribe(&room.room_id).await?;
                tracing::info!(room_id = %room.room_id, players = room.players.len(), "joined group room");
                self.machine.enter_group(room, ConnectionStatus::Online);
                self.feed = Some(feed);
                self.caller = Some(caller);
            }
            None => {
                let caller = self.identity.current_context();
                let room_id = caller
                    .as_ref()
                    .and_then(|c| c.room_id().ok())
                    .map_or_else(local_room_id, Ok)?;
                self.adopt_player(caller.as_ref());
                let shell = self.shell(room_id, group_round(None));
                self.machine.enter_group(shell, ConnectionStatus::Offline);
                let puzzle = self.fresh_puzzle().await?;
                self.machine.apply_puzzle(puzzle);
            }
        }
        Ok(())
    }

    pub async fn start_competitive(&mut self) -> Result<(), GameError> {
        let result = self.start_competitive_inner().await;
        self.settle(result)
    }

    async fn start_competitive_inner(&mut self) -> Result<(), GameError> {
        self.release();
        if self.transport().is_some() {
            return Err(GameError::CompetitiveOnline);
        }
        let caller = self.identity.current_context();
        self.adopt_player(caller.as_ref());
        let mut progress = std::collections::BTreeMap::new();
        progress.insert(
            self.player.participant_id.clone(),
            PlayerProgress::new(&self.player.participant_id, 0),
        );
        let round = Round::Competitive(CompetitiveRound {
            puzzles: Vec::new(),
            progress,
            winner_id: None,
        });
        let room = self.shell(local_room_id()?, round);
        let participant_id = self.player.participant_id.clone();
        self.machine.enter_competitive(room, &participant_id);
        self.new_series().await
    }

    /// Replaces the group puzzle. Online, the change arrives back as events.
    pub async fn new_round(&mut self) -> Result<(), GameError> {
        let result = self.new_round_inner().await;
        self.settle(result)
    }

    async fn new_round_inner(&mut self) -> Result<(), GameError> {
        if !matches!(self.machine.state(), GameState::Group { .. }) {
            return Ok(());
        }
        let puzzle = self.fresh_puzzle().await?;
        match self.transport() {
            Some(transport) => {
                let caller = self.caller.clone().ok_or(GameError::MissingContext)?;
                transport.set_puzzle(&caller, puzzle).await?;
            }
            None => self.machine.apply_puzzle(puzzle),
        }
        Ok(())
    }

    pub async fn new_competitive_series(&mut self) -> Result<(), GameError> {
        if !matches!(self.machine.state(), GameState::Competitive { .. }) {
            return Ok(());
        }
        let result = self.new_series().await;
        self.settle(result)
    }

    async fn new_series(&mut self) -> Result<(), GameError> {
        self.catalog.ensure_loaded().await?;
        let puzzles = self
            .puzzles
            .generate_series(self.machine.rules().competitive_puzzles)?;
        self.machine.new_series(puzzles, now_ms());
        Ok(())
    }

    pub fn reveal_more(&mut self) {
        self.machine.reveal_more(now_ms());
    }

    /// Normalizes and submits a character guess. Guesses naming no known
    /// character are dropped while the catalog is loaded.
    pub async fn submit_guess(&mut self, input: &str) -> Result<(), GameError> {
        let catalog = self.catalog.get();
        let key = normalize_character_key(input, catalog.as_deref());
        if key.is_empty() {
            return Ok(());
        }
        if let Some(catalog) = &catalog {
            if catalog.character(&key).is_none() {
                tracing::debug!(input, "ignoring guess for unknown character");
                return Ok(());
            }
        }

        match self.transport() {
            Some(transport) => {
                let result = match self.caller.clone() {
                    Some(caller) => transport.guess(&caller, &key).await.map(|_| ()),
                    None => Err(GameError::MissingContext),
                };
                self.settle(result)
            }
            None => {
                let guess = GuessEvent {
                    participant_id: self.player.participant_id.clone(),
                    display_name: self.player.display_name.clone(),
                    character_key: key,
                    at: now_ms(),
                    attempt_index: self.machine.next_attempt_index(&self.player.participant_id),
                };
                self.machine.apply_guess(guess);
                Ok(())
            }
        }
    }

    pub fn submit_skin_guess(&mut self, skin_name: &str) -> Option<SkinGuess> {
        let catalog = self.catalog.get();
        let participant_id = self.player.participant_id.clone();
        self.machine
            .submit_skin_guess(&participant_id, skin_name, catalog.as_deref(), now_ms())
    }

    pub fn finish_to_results(&mut self) {
        self.release();
        self.machine.finish_to_results();
    }

    /// Waits for the next room event and folds it in. `None` when there is
    /// no feed or it has closed.
    pub async fn process_next_event(&mut self) -> Option<RoomEvent> {
        let event = self.feed.as_mut()?.recv().await?;
        self.machine.apply_event(&event);
        Some(event)
    }

    /// Folds in every event that has already arrived.
    pub fn pump_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.feed.as_mut().and_then(RoomStream::try_recv) {
            self.machine.apply_event(&event);
            applied += 1;
        }
        applied
    }

    fn transport(&self) -> Option<Arc<dyn RoomTransport>> {
        match &self.connectivity {
            Connectivity::Online(transport) => Some(transport.clone()),
            Connectivity::Offline => None,
        }
    }

    async fn fresh_puzzle(&self) -> Result<Puzzle, GameError> {
        self.catalog.ensure_loaded().await?;
        Ok(self.puzzles.generate()?)
    }

    /// The caller's identity wins, then the lobby pick, then the current
    /// player.
    fn adopt_player(&mut self, caller: Option<&CallerContext>) {
        if let Some(caller) = caller {
            self.player = PlayerInfo {
                participant_id: caller.participant_id.clone(),
                display_name: caller.display_name.clone(),
            };
        } else if let Some(chosen) = self.machine.player() {
            self.player = chosen.clone();
        }
    }

    fn shell(&self, room_id: RoomId, round: Round) -> Room {
        let mut room = Room::new(room_id, round, now_ms());
        room.upsert_player(&self.player.participant_id, &self.player.display_name);
        room
    }

    fn release(&mut self) {
        self.feed = None;
        self.caller = None;
    }

    fn settle<T>(&mut self, result: Result<T, GameError>) -> Result<T, GameError> {
        if let Err(err) = &result {
            tracing::warn!(error = %err, "game action failed");
            self.fail(err.to_string());
        }
        result
    }
}

fn group_round(puzzle: Option<Puzzle>) -> Round {
    Round::Group(GroupRound {
        puzzle,
        ..GroupRound::default()
    })
}

fn local_room_id() -> Result<RoomId, GameError> {
    RoomId::new(LOCAL_GROUP, LOCAL_CHANNEL).map_err(|e| GameError::Remote(e.to_string()))
}
