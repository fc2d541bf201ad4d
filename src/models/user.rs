use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::note::Note;

/// The signed-in account and everything it owns locally.
///
/// This whole document is what gets persisted under the `"user"` key and what
/// `/user/sync` exchanges. The bearer token is stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            avatar: None,
            notes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn find_note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id() == id)
    }
}

/// Profile picture reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub url: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Avatar {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            updated_at: Utc::now(),
        }
    }
}
