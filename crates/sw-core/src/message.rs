//! Popup ⇄ coordinator message protocol.
//!
//! Requests are `{"action": "..."}` objects; each command has exactly one
//! response shape.

use serde::{Deserialize, Serialize};

/// Command accepted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Toggle,
    GetStatus,
    ResetCount,
}

impl Command {
    /// Parse an incoming message. Anything that is not a known command
    /// yields `None` and must go unanswered.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Command::deserialize(value).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub enabled: bool,
    pub blocked_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
}

/// Any coordinator response.
///
/// Untagged on the wire; `Status` is tried first because its fields are a
/// superset of `Toggle`'s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusResponse),
    Toggle(ToggleResponse),
    Reset(ResetResponse),
}

impl Response {
    pub fn as_status(&self) -> Option<StatusResponse> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_toggle(&self) -> Option<ToggleResponse> {
        match self {
            Self::Toggle(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_reset(&self) -> Option<ResetResponse> {
        match self {
            Self::Reset(r) => Some(*r),
            _ => None,
        }
    }
}
