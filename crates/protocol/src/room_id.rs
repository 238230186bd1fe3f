use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EVENTS_SUFFIX, ROOM_KEY_PREFIX};

/// `groupId ':' channelId`. The group part never contains a colon; the
/// channel part may.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(group_id: &str, channel_id: &str) -> Result<Self, RoomIdError> {
        if group_id.is_empty() || channel_id.is_empty() {
            return Err(RoomIdError::MissingPart);
        }
        if group_id.contains(':') {
            return Err(RoomIdError::ColonInGroup);
        }
        Ok(Self(format!("{group_id}:{channel_id}")))
    }

    pub fn parse(value: &str) -> Result<Self, RoomIdError> {
        let (group, channel) = value.split_once(':').ok_or(RoomIdError::MissingSeparator)?;
        Self::new(group, channel)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn group_id(&self) -> &str {
        self.0.split_once(':').map(|(g, _)| g).unwrap_or_default()
    }

    pub fn channel_id(&self) -> &str {
        self.0.split_once(':').map(|(_, c)| c).unwrap_or_default()
    }

    /// Key of the persisted room record.
    pub fn record_key(&self) -> String {
        format!("{ROOM_KEY_PREFIX}{}", self.0)
    }

    /// Pub/sub channel carrying this room's events.
    pub fn channel_name(&self) -> String {
        format!("{ROOM_KEY_PREFIX}{}{EVENTS_SUFFIX}", self.0)
    }

    /// Inverse of [`RoomId::channel_name`].
    pub fn from_channel_name(channel: &str) -> Option<Self> {
        let inner = channel
            .strip_prefix(ROOM_KEY_PREFIX)?
            .strip_suffix(EVENTS_SUFFIX)?;
        Self::parse(inner).ok()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    MissingSeparator,
    MissingPart,
    ColonInGroup,
}

impl fmt::Display for RoomIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomIdError::MissingSeparator => write!(f, "room id must look like <group>:<channel>"),
            RoomIdError::MissingPart => write!(f, "room id needs a non-empty group and channel"),
            RoomIdError::ColonInGroup => write!(f, "group id may not contain ':'"),
        }
    }
}

impl std::error::Error for RoomIdError {}
