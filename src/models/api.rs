//! Request bodies and response envelopes exchanged with the notes API.

use serde::{Deserialize, Serialize};

use super::note::Note;
use super::user::{Avatar, User};

/// Every API response carries `success` and `message`; endpoint specific
/// payload fields sit next to them at the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Default> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: T::default(),
        }
    }
}

/// Payload for responses that only carry `success` and `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Empty {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotesPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AvatarPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
}

pub type MessageResponse = ApiResponse<Empty>;
pub type AuthResponse = ApiResponse<AuthPayload>;
pub type UserResponse = ApiResponse<UserPayload>;
pub type NotesResponse = ApiResponse<NotesPayload>;
pub type AvatarResponse = ApiResponse<AvatarPayload>;

// ============================================================
// Request bodies
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameInput {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailInput {
    pub email: String,
}

/// `identifier` is either the username or the email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// The avatar is sent as a bare URL; the server answers with the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAvatarInput {
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUserInput {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncNotesInput {
    pub notes: Vec<Note>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_fields_sit_beside_the_envelope() {
        let response: NotesResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "message": "Notes synced",
            "notes": [{ "id": "note-1", "title": "x", "updatedAt": "2024-01-01T00:00:00Z" }]
        }))
        .unwrap();

        assert!(response.success);
        assert_eq!(response.message, "Notes synced");
        let notes = response.data.notes.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id(), "note-1");
    }

    #[test]
    fn failure_envelope_decodes_without_payload() {
        let response: AuthResponse = serde_json::from_value(serde_json::json!({
            "success": false,
            "message": "Invalid credentials"
        }))
        .unwrap();

        assert!(!response.success);
        assert!(response.data.user.is_none());
        assert!(response.data.token.is_none());
    }

    #[test]
    fn missing_message_defaults_to_empty() {
        let response: MessageResponse =
            serde_json::from_value(serde_json::json!({ "success": true })).unwrap();
        assert!(response.success);
        assert!(response.message.is_empty());
    }

    #[test]
    fn failure_serializes_without_payload_keys() {
        let value = serde_json::to_value(UserResponse::fail("nope")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "success": false, "message": "nope" })
        );
    }

    #[test]
    fn password_change_uses_camel_case() {
        let value = serde_json::to_value(UpdatePasswordInput {
            current_password: "old".into(),
            new_password: "new".into(),
        })
        .unwrap();
        assert_eq!(value["currentPassword"], "old");
        assert_eq!(value["newPassword"], "new");
    }
}
