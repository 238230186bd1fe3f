use super::*;
use crate::bus::tests::recorder;
use crate::bus::{LocalBus, Listener, Subscription};
use crate::catalog::tests::{sample_catalog, FlakySource};
use crate::catalog::{CatalogCache, CatalogStatus};
use crate::error::BusError;
use crate::store::{MemoryRooms, SqliteRooms};
use async_trait::async_trait;
use splashdle_protocol::{PuzzleView, VariantRef, Vec2};

fn service_with(rooms: Arc<dyn RoomRepository>, bus: Arc<dyn EventBus>) -> RoomService {
    let catalog = Arc::new(CatalogCache::preloaded(sample_catalog()));
    RoomService::new(rooms, bus, PuzzleGenerator::new(catalog))
}

fn memory_service() -> (RoomService, Arc<LocalBus>) {
    let bus = Arc::new(LocalBus::new());
    (service_with(Arc::new(MemoryRooms::new()), bus.clone()), bus)
}

fn caller(participant: &str) -> CallerContext {
    CallerContext::new("g1", "c1", participant, participant.to_uppercase())
}

fn room_id() -> RoomId {
    RoomId::new("g1", "c1").unwrap()
}

fn puzzle(key: &str) -> Puzzle {
    Puzzle {
        reference: VariantRef {
            character_key: key.to_string(),
            variant_num: 1,
        },
        view: PuzzleView {
            focus: Vec2 { x: 0.3, y: 0.3 },
            zoom: crate::MAX_ZOOM,
        },
    }
}

fn group(room: &Room) -> &GroupRound {
    match &room.round {
        Round::Group(round) => round,
        Round::Competitive(_) => panic!("expected a group room"),
    }
}

#[tokio::test]
async fn first_join_generates_puzzle_and_second_join_keeps_it() {
    let (service, _bus) = memory_service();

    let first = service.join(&caller("u1"), None).await.unwrap();
    assert_eq!(first.room_id, room_id());
    assert_eq!(first.players.len(), 1);
    let generated = group(&first).puzzle.clone().expect("generated puzzle");

    service.submit_guess(&caller("u1"), "Zed").await.unwrap();

    let second = service.join(&caller("u2"), None).await.unwrap();
    assert_eq!(second.players.len(), 2);
    assert_eq!(group(&second).puzzle.as_ref(), Some(&generated));
    assert_eq!(group(&second).guesses.len(), 1);
}

#[tokio::test]
async fn join_retries_a_failed_catalog_load() {
    let catalog = Arc::new(CatalogCache::new(Arc::new(FlakySource::new())));
    assert!(catalog.ensure_loaded().await.is_err());
    let service = RoomService::new(
        Arc::new(MemoryRooms::new()),
        Arc::new(LocalBus::new()),
        PuzzleGenerator::new(catalog.clone()),
    );

    let room = service.join(&caller("u1"), None).await.unwrap();
    assert!(group(&room).puzzle.is_some());
    assert_eq!(catalog.status(), CatalogStatus::Ready);
}

#[tokio::test]
async fn supplied_puzzle_only_fills_an_empty_slot() {
    let (service, _bus) = memory_service();
    let room = service.join(&caller("u1"), Some(puzzle("Aatrox"))).await.unwrap();
    assert_eq!(group(&room).puzzle, Some(puzzle("Aatrox")));

    let room = service.join(&caller("u2"), Some(puzzle("Zed"))).await.unwrap();
    assert_eq!(group(&room).puzzle, Some(puzzle("Aatrox")));
}

#[tokio::test]
async fn rejoin_refreshes_display_name_only() {
    let (service, _bus) = memory_service();
    let first = service.join(&caller("u1"), None).await.unwrap();
    let renamed = CallerContext::new("g1", "c1", "u1", "New Name");
    let again = service.join(&renamed, None).await.unwrap();
    assert_eq!(again.players.len(), 1);
    assert_eq!(again.players["u1"].display_name, "New Name");
    assert_eq!(group(&again).puzzle, group(&first).puzzle);
    assert!(again.updated_at >= first.updated_at);
}

#[tokio::test]
async fn attempt_indexes_follow_submission_order() {
    let (service, _bus) = memory_service();
    service.join(&caller("u1"), Some(puzzle("Aatrox"))).await.unwrap();

    let keys = ["Zed", "Ahri", "Aatrox", "Zed"];
    for (i, key) in keys.iter().enumerate() {
        let who = if i % 2 == 0 { "u1" } else { "u2" };
        service.submit_guess(&caller(who), key).await.unwrap();
    }

    let room = service.room(&room_id()).await.unwrap().unwrap();
    let indexes: Vec<u32> = group(&room).guesses.iter().map(|g| g.attempt_index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
    // Guessing upserts the player too.
    assert!(room.players.contains_key("u2"));
}

#[tokio::test]
async fn guess_never_creates_a_room() {
    let (service, _bus) = memory_service();
    let err = service.submit_guess(&caller("u1"), "Zed").await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(id) if id == room_id()));
    assert!(service.room(&room_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_fields_are_rejected_before_touching_state() {
    let (service, _bus) = memory_service();
    let blank = CallerContext::new("g1", "", "u1", "");
    match service.join(&blank, None).await {
        Err(RoomError::Validation(msg)) => assert_eq!(msg, "Missing channelId, displayName"),
        other => panic!("unexpected {other:?}"),
    }
    service.join(&caller("u1"), None).await.unwrap();
    assert!(matches!(
        service.submit_guess(&caller("u1"), "   ").await,
        Err(RoomError::Validation(_))
    ));
    let room = service.room(&room_id()).await.unwrap().unwrap();
    assert!(group(&room).guesses.is_empty());
}

#[tokio::test]
async fn set_puzzle_resets_the_round() {
    let (service, _bus) = memory_service();
    service.join(&caller("u1"), Some(puzzle("Aatrox"))).await.unwrap();
    service.submit_guess(&caller("u1"), "Aatrox").await.unwrap();

    let room = service.set_puzzle(&caller("u3"), puzzle("Zed")).await.unwrap();
    let round = group(&room);
    assert_eq!(round.puzzle, Some(puzzle("Zed")));
    assert!(round.guesses.is_empty());
    assert!(round.solve.is_none());
    assert!(round.skin_guess.is_none());
    assert!(room.players.contains_key("u3"));

    // And creates the room when it does not exist yet.
    let other = CallerContext::new("g2", "c9", "u1", "U1");
    let fresh = service.set_puzzle(&other, puzzle("Zed")).await.unwrap();
    assert_eq!(fresh.revision, 1);
}

#[tokio::test]
async fn events_published_per_operation() {
    let (service, bus) = memory_service();
    let (listener, seen) = recorder();
    let _sub = bus.subscribe(&room_id(), listener).await;

    service.join(&caller("u1"), Some(puzzle("Aatrox"))).await.unwrap();
    service.submit_guess(&caller("u1"), "Zed").await.unwrap();
    service.set_puzzle(&caller("u1"), puzzle("Zed")).await.unwrap();

    let seen = seen.lock().unwrap();
    let types: Vec<&str> = seen.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["room_updated", "guess", "puzzle", "room_updated"]);
    match &seen[1] {
        RoomEvent::Guess(guess) => {
            assert_eq!(guess.character_key, "Zed");
            assert_eq!(guess.attempt_index, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
}

struct BrokenBus;

#[async_trait]
impl EventBus for BrokenBus {
    async fn publish(&self, _room_id: &RoomId, _event: &RoomEvent) -> Result<(), BusError> {
        Err(BusError::Backend("down".to_string()))
    }

    async fn subscribe(&self, room_id: &RoomId, listener: Listener) -> Subscription {
        LocalBus::new().subscribe(room_id, listener).await
    }
}

#[tokio::test]
async fn publish_failure_keeps_the_mutation() {
    let service = service_with(Arc::new(MemoryRooms::new()), Arc::new(BrokenBus));
    service.join(&caller("u1"), None).await.unwrap();
    service.submit_guess(&caller("u1"), "Zed").await.unwrap();
    let room = service.room(&room_id()).await.unwrap().unwrap();
    assert_eq!(group(&room).guesses.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_guesses_are_all_kept() {
    let db = crate::db::temp_db("service-race");
    let service = service_with(Arc::new(SqliteRooms::new(db)), Arc::new(LocalBus::new()));
    service.join(&caller("u0"), Some(puzzle("Aatrox"))).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..6 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service.submit_guess(&caller(&format!("u{i}")), "Zed").await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let room = service.room(&room_id()).await.unwrap().unwrap();
    let mut indexes: Vec<u32> = group(&room).guesses.iter().map(|g| g.attempt_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..6).collect::<Vec<u32>>());
}
