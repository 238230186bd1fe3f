use splashdle_protocol::RoomId;

/// Errors surfaced by the room mutation service.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Missing or malformed input; nothing was touched.
    #[error("{0}")]
    Validation(String),

    #[error("Room not found: {0}")]
    NotFound(RoomId),

    /// Storage or reference data could not be reached.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
}

impl RoomError {
    pub fn validation(message: impl ToString) -> Self {
        Self::Validation(message.to_string())
    }
}

impl From<StoreError> for RoomError {
    fn from(err: StoreError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<CatalogError> for RoomError {
    fn from(err: CatalogError) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored revision moved since the room was loaded.
    #[error("Room {0} was modified concurrently")]
    Conflict(RoomId),

    /// Still busy after the bounded retries.
    #[error("Store locked in {0}")]
    Locked(&'static str),

    #[error("Store error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("Room encoding error: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl ToString) -> Self {
        Self::Backend {
            operation,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Backend(String),

    #[error("Event encoding error: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Request(String),

    #[error("Invalid catalog payload: {0}")]
    InvalidPayload(String),

    #[error("Catalog not loaded")]
    NotLoaded,
}

/// Failures on the consuming (game session) side.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("This activity needs a group, channel and participant context")]
    MissingContext,

    #[error("Competitive mode is only available offline")]
    CompetitiveOnline,

    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<RoomError> for GameError {
    fn from(err: RoomError) -> Self {
        Self::Remote(err.to_string())
    }
}
