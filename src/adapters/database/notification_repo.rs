use crate::adapters::database::records::NotificationRecord;
use crate::domain::notification::{NewNotification, Notification};
use crate::error::Result;
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, sender_id, kind, title, message, data, is_read, read_at, created_at";

#[derive(Clone, Debug, Default)]
pub struct NotificationRepository {}

impl NotificationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, notification), fields(kind = %notification.kind))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, notification: &NewNotification) -> Result<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            INSERT INTO notifications (id, recipient_id, sender_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(notification.recipient_id)
        .bind(notification.sender_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(Json(&notification.data))
        .fetch_one(conn)
        .await?;

        Ok(record.into())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn fetch_page(
        &self,
        conn: &mut PgConnection,
        recipient_id: Uuid,
        unread_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)
            ORDER BY created_at DESC, id DESC
            OFFSET $3
            LIMIT $4
            "#
        ))
        .bind(recipient_id)
        .bind(unread_only)
        .bind(offset)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn count(&self, conn: &mut PgConnection, recipient_id: Uuid, unread_only: bool) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)")
                .bind(recipient_id)
                .bind(unread_only)
                .fetch_one(conn)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(
        &self,
        conn: &mut PgConnection,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Option<Notification>> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1 AND recipient_id = $2"
        ))
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Marks one notification read. An already-read notification keeps its original `read_at`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_read(
        &self,
        conn: &mut PgConnection,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Option<Notification>> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND recipient_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_all_read(&self, conn: &mut PgConnection, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = NOW() WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(notification_id)
            .bind(recipient_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_all(&self, conn: &mut PgConnection, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }
}
