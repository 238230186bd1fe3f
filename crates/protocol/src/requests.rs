//! Request bodies for the room endpoints. Every field is optional at the
//! decoding layer so the server can answer a missing field with its own
//! validation error instead of a decoder rejection.

use serde::{Deserialize, Serialize};

use crate::Puzzle;

/// Who is acting and in which room. The `guildId`/`userId`/`userName`
/// spellings of older clients are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerFields {
    #[serde(default, alias = "guildId")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub participant_id: Option<String>,
    #[serde(default, alias = "userName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(flatten)]
    pub caller: CallerFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puzzle: Option<Puzzle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessRequest {
    #[serde(flatten)]
    pub caller: CallerFields,
    #[serde(default, alias = "championKey")]
    pub character_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleRequest {
    #[serde(flatten)]
    pub caller: CallerFields,
    #[serde(default)]
    pub puzzle: Option<Puzzle>,
}
