//! HTTP client for the notes API.
//!
//! Every endpoint answers with a JSON envelope (`success`, `message`, payload).
//! The envelope is decoded whatever the HTTP status, so callers see the
//! server's own message on failures. Only a response that is not an envelope at
//! all becomes a [`ClientError`].

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::models::api::*;
use crate::models::{Note, User};

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unauthorized: token missing or expired")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

/// Client for the notes REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    /// Create client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::with_timeout(config.api_url.clone(), config.request_timeout())
    }

    /// Create with explicit base URL and default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            client: Client::new(),
        }
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: trim_base(base_url.into()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Decode the envelope, falling back to status-based errors when the body
    /// is not one.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if status == StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            Err(e) if status.is_success() => Err(ClientError::Decode(e)),
            Err(_) => Err(ClientError::Server(format!("{}: {}", status, body))),
        }
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.request(method.clone(), path, token);
        if let Some(body) = body {
            req = req.json(body);
        }
        tracing::debug!("{} {}{}", method, self.base_url, path);
        let response = req.send().await?;
        self.handle_response(response).await
    }

    /// Whether the API host answers at all. Any HTTP status counts as reachable.
    pub async fn probe(&self) -> bool {
        match self.client.head(&self.base_url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", self.base_url, e);
                false
            }
        }
    }

    // ============================================================
    // Public account operations
    // ============================================================

    pub async fn check_username_availability(
        &self,
        username: &str,
    ) -> Result<MessageResponse, ClientError> {
        let body = UsernameInput {
            username: username.to_string(),
        };
        self.send(Method::POST, "/user/check-username-availability", None, Some(&body))
            .await
    }

    pub async fn check_email_availability(
        &self,
        email: &str,
    ) -> Result<MessageResponse, ClientError> {
        let body = EmailInput {
            email: email.to_string(),
        };
        self.send(Method::POST, "/user/check-email-availability", None, Some(&body))
            .await
    }

    pub async fn login(&self, input: &LoginInput) -> Result<AuthResponse, ClientError> {
        self.send(Method::POST, "/user/login", None, Some(input)).await
    }

    pub async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, ClientError> {
        self.send(Method::POST, "/user/register", None, Some(input))
            .await
    }

    pub async fn send_reset_password(&self, email: &str) -> Result<MessageResponse, ClientError> {
        let body = EmailInput {
            email: email.to_string(),
        };
        self.send(Method::POST, "/user/send-reset-password", None, Some(&body))
            .await
    }

    // ============================================================
    // Authenticated account operations
    // ============================================================

    pub async fn update_username(
        &self,
        username: &str,
        token: &str,
    ) -> Result<UserResponse, ClientError> {
        let body = UsernameInput {
            username: username.to_string(),
        };
        self.send(Method::PUT, "/user/update-username", Some(token), Some(&body))
            .await
    }

    pub async fn update_email(&self, email: &str, token: &str) -> Result<UserResponse, ClientError> {
        let body = EmailInput {
            email: email.to_string(),
        };
        self.send(Method::PUT, "/user/update-email", Some(token), Some(&body))
            .await
    }

    pub async fn update_password(
        &self,
        input: &UpdatePasswordInput,
        token: &str,
    ) -> Result<MessageResponse, ClientError> {
        self.send(Method::PUT, "/user/update-password", Some(token), Some(input))
            .await
    }

    pub async fn update_avatar(&self, url: &str, token: &str) -> Result<AvatarResponse, ClientError> {
        let body = UpdateAvatarInput {
            avatar: url.to_string(),
        };
        self.send(Method::PUT, "/user/update-avatar", Some(token), Some(&body))
            .await
    }

    pub async fn delete_user(&self, token: &str) -> Result<MessageResponse, ClientError> {
        self.send::<Empty, _>(Method::DELETE, "/user/delete-user", Some(token), None)
            .await
    }

    // ============================================================
    // Sync
    // ============================================================

    /// Push the whole user document; the server answers with its copy.
    pub async fn sync_user(&self, user: &User, token: &str) -> Result<UserResponse, ClientError> {
        let body = serde_json::json!({ "user": user });
        self.send(Method::PUT, "/user/sync", Some(token), Some(&body))
            .await
    }

    /// Push the whole note collection; the server answers with its collection.
    pub async fn sync_notes(&self, notes: &[Note], token: &str) -> Result<NotesResponse, ClientError> {
        let body = serde_json::json!({ "notes": notes });
        self.send(Method::PUT, "/note/sync", Some(token), Some(&body))
            .await
    }
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
