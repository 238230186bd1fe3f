use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use splashdle_engine::{CallerContext, CatalogCache, RoomError, RoomService, RoomStream};
use splashdle_protocol::{
    paths, CallerFields, GuessRequest, JoinRequest, Puzzle, PuzzleRequest, Room, RoomId,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;

pub use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub service: RoomService,
    pub catalog: Arc<CatalogCache>,
    /// Browser origins allowed besides localhost.
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(service: RoomService, catalog: Arc<CatalogCache>) -> Self {
        Self {
            service,
            catalog,
            allowed_origins: Arc::from(Vec::new()),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins.into();
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = room_cors(state.allowed_origins.clone());
    Router::new()
        .route("/health", get(health))
        .route(paths::JOIN, post(api_join))
        .route(paths::GUESS, post(api_guess))
        .route(paths::PUZZLE, post(api_puzzle))
        .route(paths::STREAM, get(api_stream))
        .route(paths::RANDOM_PUZZLE, get(api_random_puzzle))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        // Never `Access-Control-Allow-Origin: *`; only localhost and the
        // configured embedding origins may drive rooms from a browser.
        .layer(cors)
}

/// Error body is always `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        let status = match &err {
            RoomError::Validation(_) => StatusCode::BAD_REQUEST,
            RoomError::NotFound(_) => StatusCode::NOT_FOUND,
            RoomError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            tracing::warn!(status = self.0.as_u16(), error = %self.1, "request failed");
        }
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Request body that rejects malformed JSON with the usual error envelope.
type JsonBody<T> = Result<Json<T>, JsonRejection>;

async fn health() -> &'static str {
    "ok"
}

/// Caller identity from a request body, rejecting blank fields together with
/// any request-specific ones in `also_missing`.
fn caller_context(fields: &CallerFields, also_missing: &[&'static str]) -> Result<CallerContext, ApiError> {
    let ctx = CallerContext::new(
        fields.group_id.clone().unwrap_or_default(),
        fields.channel_id.clone().unwrap_or_default(),
        fields.participant_id.clone().unwrap_or_default(),
        fields.display_name.clone().unwrap_or_default(),
    );
    let mut missing = ctx.missing_fields();
    missing.extend_from_slice(also_missing);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!("Missing {}", missing.join(", "))));
    }
    Ok(ctx)
}

async fn api_join(State(state): State<Arc<AppState>>, body: JsonBody<JoinRequest>) -> ApiResult<Room> {
    let Json(req) = body?;
    let ctx = caller_context(&req.caller, &[])?;
    Ok(Json(state.service.join(&ctx, req.puzzle).await?))
}

async fn api_guess(State(state): State<Arc<AppState>>, body: JsonBody<GuessRequest>) -> ApiResult<Room> {
    let Json(req) = body?;
    let character_key = req
        .character_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    let also_missing: &[&'static str] = if character_key.is_some() {
        &[]
    } else {
        &["characterKey"]
    };
    let ctx = caller_context(&req.caller, also_missing)?;
    let character_key = character_key.unwrap_or_default();
    Ok(Json(state.service.submit_guess(&ctx, character_key).await?))
}

async fn api_puzzle(State(state): State<Arc<AppState>>, body: JsonBody<PuzzleRequest>) -> ApiResult<Room> {
    let Json(req) = body?;
    let also_missing: &[&'static str] = if req.puzzle.is_some() {
        &[]
    } else {
        &["puzzle"]
    };
    let ctx = caller_context(&req.caller, also_missing)?;
    let Some(puzzle) = req.puzzle else {
        return Err(ApiError::bad_request("Missing puzzle"));
    };
    Ok(Json(state.service.set_puzzle(&ctx, puzzle).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamQuery {
    #[serde(default)]
    room_id: Option<String>,
}

async fn api_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let raw = query
        .room_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing roomId"))?;
    let room_id = RoomId::parse(raw.trim()).map_err(|e| ApiError::bad_request(format!("Invalid roomId: {e}")))?;

    let feed = RoomStream::open(&state.service, &room_id).await?;
    tracing::info!(room_id = %room_id, "stream client connected");
    let events = feed
        .into_stream()
        .map(|event| Event::default().json_data(&event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn api_random_puzzle(State(state): State<Arc<AppState>>) -> ApiResult<Puzzle> {
    state
        .catalog
        .ensure_loaded()
        .await
        .map_err(RoomError::from)?;
    let puzzle = state
        .service
        .puzzles()
        .generate()
        .map_err(RoomError::from)?;
    Ok(Json(puzzle))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(addr)
}

fn room_cors(extra: Arc<[String]>) -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
            is_allowed_origin(origin, &extra)
        }))
}

fn is_allowed_origin(origin: &axum::http::HeaderValue, extra: &[String]) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    if extra.iter().any(|allowed| allowed.trim_end_matches('/') == s) {
        return true;
    }

    // Dev server and local reverse proxies.
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}

#[cfg(test)]
mod tests;
