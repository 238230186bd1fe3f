use super::*;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use clap::Parser;
use http_body_util::BodyExt;
use splashdle_engine::backend::Backend;
use splashdle_engine::catalog::{Catalog, Character, FileSource, Variant};
use splashdle_engine::db::Db;
use splashdle_engine::PuzzleGenerator;
use tower::ServiceExt;

fn catalog() -> Catalog {
    Catalog::new(
        "14.20.1",
        [
            Character {
                id: "Aatrox".to_string(),
                key: "266".to_string(),
                name: "Aatrox".to_string(),
                variants: vec![
                    Variant { num: 0, name: "default".to_string() },
                    Variant { num: 2, name: "Mecha Aatrox".to_string() },
                ],
            },
            Character {
                id: "Zed".to_string(),
                key: "238".to_string(),
                name: "Zed".to_string(),
                variants: vec![Variant { num: 0, name: "default".to_string() }],
            },
        ],
    )
}

fn state_with(backend: Backend, catalog: Arc<CatalogCache>) -> AppState {
    let (rooms, bus) = backend.build();
    let service = RoomService::new(rooms, bus, PuzzleGenerator::new(catalog.clone()));
    AppState::new(service, catalog)
}

fn app() -> Router {
    build_router(state_with(
        Backend::Ephemeral,
        Arc::new(CatalogCache::preloaded(catalog())),
    ))
}

fn temp_db() -> Db {
    Db::new(std::env::temp_dir().join(format!(
        "splashdle-server-test-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    )))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn caller(participant: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "groupId": "g1",
        "channelId": "c1",
        "participantId": participant,
        "displayName": name,
    })
}

fn with(mut base: serde_json::Value, key: &str, value: serde_json::Value) -> serde_json::Value {
    base[key] = value;
    base
}

#[tokio::test]
async fn join_creates_room_with_generated_puzzle() {
    let app = app();
    let (status, room) = send(&app, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["roomId"], "g1:c1");
    assert_eq!(room["mode"], "group");
    assert_eq!(room["players"]["u1"]["displayName"], "Ana");
    assert_eq!(room["puzzle"]["view"]["zoom"], 3.0);
    assert_eq!(room["guesses"], serde_json::json!([]));

    let (_, again) = send(&app, post_json(paths::JOIN, caller("u2", "Bo"))).await;
    assert_eq!(again["puzzle"], room["puzzle"]);
    assert_eq!(again["players"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_fields_are_400() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(paths::JOIN, serde_json::json!({ "groupId": "g1", "participantId": "u1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing channelId, displayName");

    let (status, body) = send(&app, post_json(paths::GUESS, caller("u1", "Ana"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing characterKey");

    let (status, body) = send(&app, post_json(paths::PUZZLE, caller("u1", "Ana"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing puzzle");
}

#[tokio::test]
async fn malformed_bodies_are_400_with_error_envelope() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(paths::PUZZLE, with(caller("u1", "Ana"), "puzzle", serde_json::json!({ "bogus": 1 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("reference"));

    let (status, body) = send(
        &app,
        post_json(paths::JOIN, with(caller("u1", "Ana"), "groupId", 12345.into())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid type"));
}

#[tokio::test]
async fn guess_without_room_is_404() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(paths::GUESS, with(caller("u1", "Ana"), "characterKey", "Zed".into())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Room not found: g1:c1");
}

#[tokio::test]
async fn guesses_get_sequential_attempt_indexes() {
    let app = app();
    send(&app, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    for (i, key) in ["Zed", "Aatrox", "Zed"].into_iter().enumerate() {
        let who = if i % 2 == 0 { "u1" } else { "u2" };
        let (status, room) = send(
            &app,
            post_json(paths::GUESS, with(caller(who, who), "characterKey", key.into())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(room["guesses"][i]["attemptIndex"], i as u64);
    }
}

#[tokio::test]
async fn set_puzzle_resets_guesses() {
    let app = app();
    send(&app, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    send(
        &app,
        post_json(paths::GUESS, with(caller("u1", "Ana"), "characterKey", "Zed".into())),
    )
    .await;

    let puzzle = serde_json::json!({
        "reference": { "characterKey": "Aatrox", "variantNum": 2 },
        "view": { "focus": { "x": 0.3, "y": 0.7 }, "zoom": 3.0 }
    });
    let (status, room) = send(
        &app,
        post_json(paths::PUZZLE, with(caller("u1", "Ana"), "puzzle", puzzle.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["puzzle"], puzzle);
    assert_eq!(room["guesses"], serde_json::json!([]));
    assert!(room.get("solve").is_none());
}

#[tokio::test]
async fn stream_requires_room_id() {
    let app = app();
    let req = Request::builder()
        .uri(paths::STREAM)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing roomId");

    let req = Request::builder()
        .uri(format!("{}?roomId=nocolon", paths::STREAM))
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_starts_with_snapshot() {
    let app = app();
    send(&app, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    for key in ["Zed", "266"] {
        send(
            &app,
            post_json(paths::GUESS, with(caller("u1", "Ana"), "characterKey", key.into())),
        )
        .await;
    }

    let req = Request::builder()
        .uri(format!("{}?roomId=g1%3Ac1", paths::STREAM))
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut body = res.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    let data = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let event: serde_json::Value = serde_json::from_str(data).unwrap();
    assert_eq!(event["type"], "init");
    assert_eq!(event["payload"]["guesses"].as_array().unwrap().len(), 2);
    assert_eq!(event["payload"]["guesses"][1]["characterKey"], "266");
}

#[tokio::test]
async fn random_puzzle_needs_a_catalog() {
    let (status, puzzle) = send(
        &app(),
        Request::builder()
            .uri(paths::RANDOM_PUZZLE)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(puzzle["view"]["zoom"], 3.0);

    let missing = std::env::temp_dir().join("splashdle-no-such-catalog.json");
    let app = build_router(state_with(
        Backend::Ephemeral,
        Arc::new(CatalogCache::new(Arc::new(FileSource::new(missing)))),
    ));
    let (status, body) = send(
        &app,
        Request::builder()
            .uri(paths::RANDOM_PUZZLE)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    // Joining still works; the room simply has no puzzle yet.
    let (status, room) = send(&app, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(room.get("puzzle").is_none());
}

#[tokio::test]
async fn durable_backend_serves_rooms_across_routers() {
    let db = temp_db();
    let catalog = Arc::new(CatalogCache::preloaded(catalog()));
    let first = build_router(state_with(Backend::durable(db.clone()), catalog.clone()));
    let second = build_router(state_with(Backend::durable(db), catalog));

    let (status, _) = send(&first, post_json(paths::JOIN, caller("u1", "Ana"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, room) = send(
        &second,
        post_json(paths::GUESS, with(caller("u2", "Bo"), "characterKey", "Zed".into())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["players"].as_object().unwrap().len(), 2);
    assert_eq!(room["revision"], 2);
}

#[tokio::test]
async fn handler_errors_carry_status() {
    let state = State(Arc::new(state_with(
        Backend::Ephemeral,
        Arc::new(CatalogCache::preloaded(catalog())),
    )));
    let req = GuessRequest {
        caller: CallerFields {
            group_id: Some("g9".into()),
            channel_id: Some("c9".into()),
            participant_id: Some("u1".into()),
            display_name: Some("Ana".into()),
        },
        character_key: Some("Zed".into()),
    };
    let err = api_guess(state, Ok(Json(req))).await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[test]
fn cors_allows_localhost_and_configured_origins() {
    let extra = vec!["https://embed.example.com/".to_string()];
    let ok = |s: &'static str| is_allowed_origin(&HeaderValue::from_static(s), &extra);
    assert!(ok("http://localhost:5173"));
    assert!(ok("https://127.0.0.1"));
    assert!(ok("https://embed.example.com"));
    assert!(!ok("https://localhost.evil.example"));
    assert!(!ok("https://example.com"));
}

#[test]
fn config_picks_backend_from_db_path() {
    let config = Config::try_parse_from([
        "splashdle-server",
        "--addr",
        "0.0.0.0:8080",
        "--allow-origin",
        "https://a.example",
        "--allow-origin",
        "https://b.example",
    ])
    .unwrap();
    assert_eq!(config.addr.port(), 8080);
    assert_eq!(config.allow_origins.len(), 2);

    let durable = Config::try_parse_from(["splashdle-server", "--db-path", "/tmp/rooms.db"]).unwrap();
    assert_eq!(durable.backend().name(), "durable");
}
