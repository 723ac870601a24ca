use crate::domain::user::{Role, UserProfile};
use serde::Deserialize;
use uuid::Uuid;

/// Display profile pushed by the account service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_blocked: bool,
}

impl UpsertUserRequest {
    #[must_use]
    pub fn into_profile(self, id: Uuid) -> UserProfile {
        UserProfile {
            id,
            name: self.name,
            avatar: self.avatar.filter(|a| !a.is_empty()),
            role: self.role,
            is_blocked: self.is_blocked,
        }
    }
}
