use serde::{Deserialize, Serialize};

use crate::models::{AccountKind, UserId};

// -- Messages --

/// Older clients also post an `isAiAssistant` flag; it is ignored. The
/// stored flag is derived from the sender at the write site.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub from_id: i64,
    pub to_id: i64,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantTurnRequest {
    pub from_id: UserId,
    pub content: String,
}

// -- Users --

/// Unknown fields are tolerated here: clients wired to an external identity
/// provider post credential material alongside the profile, which the server
/// has no use for.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
}

// -- Businesses --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessRequest {
    pub user_id: UserId,
    pub description: String,
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
