use crate::domain::user::UserProfile;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) avatar: Option<String>,
    pub(crate) role: String,
    pub(crate) is_blocked: bool,
}

impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            avatar: record.avatar,
            role: record.role.parse().unwrap_or_default(),
            is_blocked: record.is_blocked,
        }
    }
}
