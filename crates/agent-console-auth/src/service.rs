//! Contract for the remote auth service the engine consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::session::SessionRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Profile fields of the signed-in user. Unknown fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl UserInfo {
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

/// The `user` object of a "current user info" response.
///
/// `permissions` and `accessible_routes` stay optional here so a misshapen
/// response can be told apart from a hard failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(
        default,
        rename = "accessibleRoutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub accessible_routes: Option<Vec<String>>,
    #[serde(default, rename = "groupIds")]
    pub group_ids: Vec<i64>,
    #[serde(flatten)]
    pub info: UserInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUserInfo {
    pub user: UserPayload,
}

impl CurrentUserInfo {
    pub fn from_json(value: Value) -> Result<Self, AuthServiceError> {
        serde_json::from_value(value)
            .map_err(|error| AuthServiceError::InvalidResponse(error.to_string()))
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// `Ok(None)` means the service answered without a user.
    async fn get_current_user_info(&self) -> Result<Option<CurrentUserInfo>, AuthServiceError>;
    async fn get_session(&self) -> Result<Option<SessionRecord>, AuthServiceError>;
    async fn logout(&self) -> Result<(), AuthServiceError>;
}
