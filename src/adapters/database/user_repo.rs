use crate::adapters::database::records::UserRecord;
use crate::domain::user::UserProfile;
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_many(&self, conn: &mut PgConnection, user_ids: &[Uuid]) -> Result<Vec<UserProfile>> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, name, avatar, role, is_blocked
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, profile), fields(user_id = %profile.id))]
    pub(crate) async fn upsert(&self, conn: &mut PgConnection, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, avatar, role, is_blocked)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, avatar = EXCLUDED.avatar, role = EXCLUDED.role, is_blocked = EXCLUDED.is_blocked
            "#,
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(profile.avatar.as_deref())
        .bind(profile.role.as_str())
        .bind(profile.is_blocked)
        .execute(conn)
        .await?;

        Ok(())
    }
}
