//! Who is playing, and in which (group, channel). Identity is trusted as given.

use splashdle_protocol::{RoomId, RoomIdError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub group_id: String,
    pub channel_id: String,
    pub participant_id: String,
    pub display_name: String,
}

impl CallerContext {
    pub fn new(
        group_id: impl Into<String>,
        channel_id: impl Into<String>,
        participant_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            channel_id: channel_id.into(),
            participant_id: participant_id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn room_id(&self) -> Result<RoomId, RoomIdError> {
        RoomId::new(&self.group_id, &self.channel_id)
    }

    /// Names of the fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("groupId", &self.group_id),
            ("channelId", &self.channel_id),
            ("participantId", &self.participant_id),
            ("displayName", &self.display_name),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Reads a launch query string such as
    /// `groupId=1&channelId=2&participantId=3&displayName=Ana`. The older
    /// `guildId`/`userId`/`userName` spellings are accepted too.
    pub fn from_query(query: &str) -> Option<Self> {
        let mut ctx = Self::new("", "", "", "");
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let slot = match key.as_ref() {
                "groupId" | "guildId" => &mut ctx.group_id,
                "channelId" => &mut ctx.channel_id,
                "participantId" | "userId" => &mut ctx.participant_id,
                "displayName" | "userName" => &mut ctx.display_name,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = value.into_owned();
            }
        }
        ctx.missing_fields().is_empty().then_some(ctx)
    }
}

pub trait ContextProvider: Send + Sync {
    fn current_context(&self) -> Option<CallerContext>;
}

/// Fixed context, or none at all for offline play.
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub Option<CallerContext>);

impl ContextProvider for StaticContext {
    fn current_context(&self) -> Option<CallerContext> {
        self.0.clone()
    }
}
