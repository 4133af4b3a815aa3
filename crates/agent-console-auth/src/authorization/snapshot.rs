use std::collections::BTreeSet;

use crate::service::{UserInfo, UserPayload};

/// The engine's projection of who the user is and what they may reach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSnapshot {
    pub user: Option<UserInfo>,
    pub group_ids: Vec<i64>,
    pub permissions: BTreeSet<String>,
    pub accessible_routes: BTreeSet<String>,
}

/// Why a "current user info" payload was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRejection {
    MissingPermissions,
    MissingAccessibleRoutes,
}

impl SnapshotRejection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingPermissions => "missing_permissions",
            Self::MissingAccessibleRoutes => "missing_accessible_routes",
        }
    }
}

impl AuthorizationSnapshot {
    /// Builds a snapshot from one response; both permission fields are required.
    pub fn from_payload(payload: UserPayload) -> Result<Self, SnapshotRejection> {
        let Some(permissions) = payload.permissions else {
            return Err(SnapshotRejection::MissingPermissions);
        };
        let Some(accessible_routes) = payload.accessible_routes else {
            return Err(SnapshotRejection::MissingAccessibleRoutes);
        };
        Ok(Self {
            user: Some(payload.info),
            group_ids: payload.group_ids,
            permissions: permissions.into_iter().collect(),
            accessible_routes: accessible_routes.into_iter().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.permissions.is_empty() && self.accessible_routes.is_empty()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions
            .iter()
            .any(|permission| self.permissions.contains(permission.as_ref()))
    }

    pub fn can_access_route(&self, clean_path: &str) -> bool {
        self.accessible_routes.contains(clean_path)
    }
}
