use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use splashdle_protocol::{
    paths, CallerFields, GuessRequest, JoinRequest, Puzzle, PuzzleRequest, Room, RoomEvent, RoomId,
};
use tokio::sync::mpsc;
use url::Url;

use super::transport::RoomTransport;
use crate::error::GameError;
use crate::identity::CallerContext;
use crate::stream::RoomStream;

/// Reaches a splashdle server over its JSON + SSE surface.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, GameError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GameError::Remote(format!("invalid server url {base_url}: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GameError> {
        self.base_url
            .join(path)
            .map_err(|e| GameError::Remote(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
        body: &B,
    ) -> Result<T, GameError> {
        let res = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|e| GameError::Remote(format!("{what} failed: {e}")))?;
        let status = res.status();
        if !status.is_success() {
            let detail = res
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_default();
            return Err(GameError::Remote(
                format!("{what} failed: {} {detail}", status.as_u16())
                    .trim_end()
                    .to_string(),
            ));
        }
        res.json()
            .await
            .map_err(|e| GameError::Remote(format!("{what} failed: {e}")))
    }
}

fn caller_fields(caller: &CallerContext) -> CallerFields {
    CallerFields {
        group_id: Some(caller.group_id.clone()),
        channel_id: Some(caller.channel_id.clone()),
        participant_id: Some(caller.participant_id.clone()),
        display_name: Some(caller.display_name.clone()),
    }
}

#[async_trait]
impl RoomTransport for HttpTransport {
    async fn join(&self, caller: &CallerContext, puzzle: Option<Puzzle>) -> Result<Room, GameError> {
        let body = JoinRequest {
            caller: caller_fields(caller),
            puzzle,
        };
        self.post(paths::JOIN, "Join", &body).await
    }

    async fn guess(&self, caller: &CallerContext, character_key: &str) -> Result<Room, GameError> {
        let body = GuessRequest {
            caller: caller_fields(caller),
            character_key: Some(character_key.to_string()),
        };
        self.post(paths::GUESS, "Guess", &body).await
    }

    async fn set_puzzle(&self, caller: &CallerContext, puzzle: Puzzle) -> Result<Room, GameError> {
        let body = PuzzleRequest {
            caller: caller_fields(caller),
            puzzle: Some(puzzle),
        };
        self.post(paths::PUZZLE, "Puzzle set", &body).await
    }

    async fn subscribe(&self, room_id: &RoomId) -> Result<RoomStream, GameError> {
        let mut url = self.endpoint(paths::STREAM)?;
        url.query_pairs_mut().append_pair("roomId", room_id.as_str());
        let res = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GameError::Remote(format!("Subscribe failed: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let room_id = room_id.clone();
        let task = tokio::spawn(async move {
            let mut body = res.bytes_stream();
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::debug!(room_id = %room_id, error = %err, "event stream closed");
                        break;
                    }
                };
                for event in decoder.feed(&chunk) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
        });
        Ok(RoomStream::from_task(rx, task))
    }
}

/// Incremental `text/event-stream` reader yielding the `data:` payloads that
/// decode as room events. Comments and malformed payloads are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    data: String,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<RoomEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        events
    }

    fn dispatch(&mut self) -> Option<RoomEvent> {
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        match serde_json::from_str(&data) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed event");
                None
            }
        }
    }
}
