use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, content, message_type, attachment, \
     booking_reference, reply_to_message_id, reply_to_text, reply_to_sender_name, is_read, read_at, is_deleted, \
     deleted_at, created_at";

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a new message in the database.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message), fields(conversation_id = %message.conversation_id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, message: &NewMessage) -> Result<Message> {
        let (reply_id, reply_text, reply_sender) = match &message.reply_to {
            Some(reply) => (Some(reply.message_id), reply.text.as_deref(), reply.sender_name.as_deref()),
            None => (None, None, None),
        };

        let result = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, message_type, attachment,
                                  booking_reference, reply_to_message_id, reply_to_text, reply_to_sender_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.attachment.as_ref().map(Json))
        .bind(message.booking_reference)
        .bind(reply_id)
        .bind(reply_text)
        .bind(reply_sender)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                Err(AppError::not_found("Conversation not found"))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, message_id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(message_id)
            .fetch_optional(conn)
            .await?;

        Ok(record.map(Into::into))
    }

    /// A page of live messages, newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn fetch_page(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#
        ))
        .bind(conversation_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn count_live(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND NOT is_deleted")
                .bind(conversation_id)
                .fetch_one(conn)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// The newest live message of a conversation, used to rebuild the last-message cache.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn latest_live(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(conversation_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_read(&self, conn: &mut PgConnection, conversation_id: Uuid, reader: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW()
            WHERE conversation_id = $1 AND receiver_id = $2 AND NOT is_read AND NOT is_deleted
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Flags a live message as deleted. Returns `None` if it is missing or already deleted.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn soft_delete(&self, conn: &mut PgConnection, message_id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages
            SET is_deleted = TRUE, deleted_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, query))]
    pub(crate) async fn search(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender_id = $1 OR receiver_id = $1)
              AND NOT is_deleted
              AND strpos(lower(content), lower($2)) > 0
              AND ($3::uuid IS NULL OR conversation_id = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#
        ))
        .bind(user_id)
        .bind(query)
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Deletes messages that were soft-deleted before the cutoff.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn purge_deleted(&self, conn: &mut PgConnection, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE is_deleted AND deleted_at < $1")
            .bind(cutoff)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }
}
