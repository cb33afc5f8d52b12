//! Auxiliary backend HTTP API: user profiles and chat session management.
//! External collaborators to the session manager, not part of the dialog
//! lifecycle.

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::protocol::UserProfile;
use reqwest::Client;
use uuid::Uuid;

pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(config: &BackendConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    pub async fn get_user_profiles(&self) -> Result<Vec<UserProfile>, BackendError> {
        let url = format!("{}/user-profiles", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))
    }

    /// Delete the server-side chat session for a conversation. Called when
    /// the user starts a new topic.
    pub async fn clear_chat_session(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), BackendError> {
        let url = format!(
            "{}/chat-sessions/{}/{}",
            self.base_url, user_id, conversation_id
        );
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
