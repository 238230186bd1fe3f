//! The three room mutations: join, guess and set-puzzle.
//!
//! Each one loads the room, mutates it, persists it and publishes. Persists
//! are compare-and-swap on the room revision; on a conflict the whole
//! load/mutate/persist cycle runs again against the fresh copy, so
//! concurrent guesses in one room get consecutive attempt indexes instead of
//! overwriting each other.

use std::sync::Arc;

use splashdle_protocol::{GroupRound, GuessEvent, Puzzle, Room, RoomEvent, RoomId, Round};

use crate::bus::EventBus;
use crate::error::{RoomError, StoreError};
use crate::identity::CallerContext;
use crate::now_ms;
use crate::puzzle::PuzzleGenerator;
use crate::store::RoomRepository;

pub const CONFLICT_RETRIES: u32 = 8;

#[derive(Clone)]
pub struct RoomService {
    rooms: Arc<dyn RoomRepository>,
    bus: Arc<dyn EventBus>,
    puzzles: PuzzleGenerator,
}

impl RoomService {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        bus: Arc<dyn EventBus>,
        puzzles: PuzzleGenerator,
    ) -> Self {
        Self {
            rooms,
            bus,
            puzzles,
        }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn puzzles(&self) -> &PuzzleGenerator {
        &self.puzzles
    }

    pub async fn room(&self, room_id: &RoomId) -> Result<Option<Room>, RoomError> {
        Ok(self.rooms.load(room_id).await?)
    }

    /// Creates the room if needed and registers the caller. A room without a
    /// puzzle takes the supplied one, or a freshly generated one when none is
    /// supplied. A catalog that failed to load earlier is retried first.
    pub async fn join(&self, caller: &CallerContext, puzzle: Option<Puzzle>) -> Result<Room, RoomError> {
        let room_id = checked_room_id(caller)?;
        if puzzle.is_none() && self.puzzles.catalog().get().is_none() {
            // A failed earlier load is retried here; the room is still joined without it.
            if let Err(err) = self.puzzles.catalog().ensure_loaded().await {
                tracing::warn!(room_id = %room_id, error = %err, "catalog still unavailable");
            }
        }
        let (room, ()) = self
            .mutate(&room_id, |current, at| {
                let mut room = current.unwrap_or_else(|| new_group_room(&room_id, at));
                match &mut room.round {
                    Round::Group(round) if round.puzzle.is_none() => {
                        if let Some(p) = puzzle.clone().or_else(|| self.generated_puzzle(&room_id)) {
                            round.puzzle = Some(p);
                            round.guesses.clear();
                        }
                    }
                    Round::Group(_) | Round::Competitive(_) => {}
                }
                room.upsert_player(&caller.participant_id, &caller.display_name);
                room.updated_at = at;
                Ok((room, ()))
            })
            .await?;

        tracing::info!(
            room_id = %room_id,
            participant_id = %caller.participant_id,
            players = room.players.len(),
            "joined room"
        );
        self.publish(&room_id, RoomEvent::room_updated(&room)).await;
        Ok(room)
    }

    /// Appends a guess with the next attempt index. Correctness is judged by
    /// the consumers, not here.
    pub async fn submit_guess(&self, caller: &CallerContext, character_key: &str) -> Result<Room, RoomError> {
        let room_id = checked_room_id(caller)?;
        let character_key = character_key.trim();
        if character_key.is_empty() {
            return Err(RoomError::validation("Missing characterKey"));
        }

        let (room, guess) = self
            .mutate(&room_id, |current, at| {
                let mut room = current.ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
                room.upsert_player(&caller.participant_id, &caller.display_name);
                let guess = match &mut room.round {
                    Round::Group(round) => {
                        let guess = GuessEvent {
                            participant_id: caller.participant_id.clone(),
                            display_name: caller.display_name.clone(),
                            character_key: character_key.to_string(),
                            at,
                            attempt_index: u32::try_from(round.guesses.len()).unwrap_or(u32::MAX),
                        };
                        round.guesses.push(guess.clone());
                        guess
                    }
                    Round::Competitive(_) => {
                        return Err(RoomError::validation(
                            "Guesses are only accepted for group rooms",
                        ))
                    }
                };
                room.updated_at = at;
                Ok((room, guess))
            })
            .await?;

        tracing::info!(
            room_id = %room_id,
            participant_id = %guess.participant_id,
            attempt_index = guess.attempt_index,
            "guess recorded"
        );
        self.publish(&room_id, RoomEvent::Guess(guess)).await;
        Ok(room)
    }

    /// Installs `puzzle` as the room's current challenge and resets the round.
    pub async fn set_puzzle(&self, caller: &CallerContext, puzzle: Puzzle) -> Result<Room, RoomError> {
        let room_id = checked_room_id(caller)?;
        let (room, ()) = self
            .mutate(&room_id, |current, at| {
                let mut room = current.unwrap_or_else(|| new_group_room(&room_id, at));
                match &mut room.round {
                    Round::Group(round) => {
                        *round = GroupRound {
                            puzzle: Some(puzzle.clone()),
                            ..GroupRound::default()
                        };
                    }
                    Round::Competitive(_) => {
                        return Err(RoomError::validation(
                            "Puzzles can only be set on group rooms",
                        ))
                    }
                }
                room.upsert_player(&caller.participant_id, &caller.display_name);
                room.updated_at = at;
                Ok((room, ()))
            })
            .await?;

        tracing::info!(
            room_id = %room_id,
            participant_id = %caller.participant_id,
            character = %puzzle.reference.character_key,
            "puzzle set"
        );
        // Both events go out so consumers watching only one type converge.
        self.publish(&room_id, RoomEvent::Puzzle(puzzle)).await;
        self.publish(&room_id, RoomEvent::room_updated(&room)).await;
        Ok(room)
    }

    async fn mutate<T, F>(&self, room_id: &RoomId, mut apply: F) -> Result<(Room, T), RoomError>
    where
        F: FnMut(Option<Room>, i64) -> Result<(Room, T), RoomError>,
    {
        for attempt in 0..=CONFLICT_RETRIES {
            let current = self.rooms.load(room_id).await?;
            let (room, extra) = apply(current, now_ms())?;
            match self.rooms.persist(&room).await {
                Ok(stored) => return Ok((stored, extra)),
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!(room_id = %room_id, attempt, "room changed underneath; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(RoomError::Upstream(format!(
            "room {room_id} kept changing; gave up after {} attempts",
            CONFLICT_RETRIES + 1
        )))
    }

    fn generated_puzzle(&self, room_id: &RoomId) -> Option<Puzzle> {
        match self.puzzles.generate() {
            Ok(puzzle) => Some(puzzle),
            Err(err) => {
                tracing::warn!(room_id = %room_id, error = %err, "no puzzle for new room");
                None
            }
        }
    }

    /// Delivery is best effort: a failed publish never undoes the mutation.
    async fn publish(&self, room_id: &RoomId, event: RoomEvent) {
        if let Err(err) = self.bus.publish(room_id, &event).await {
            tracing::warn!(
                room_id = %room_id,
                event_type = event.event_type(),
                error = %err,
                "publish failed"
            );
        }
    }
}

fn new_group_room(room_id: &RoomId, at: i64) -> Room {
    Room::new(room_id.clone(), Round::Group(GroupRound::default()), at)
}

fn checked_room_id(caller: &CallerContext) -> Result<RoomId, RoomError> {
    let missing = caller.missing_fields();
    if !missing.is_empty() {
        return Err(RoomError::Validation(format!("Missing {}", missing.join(", "))));
    }
    caller.room_id().map_err(RoomError::validation)
}

#[cfg(test)]
mod tests;
