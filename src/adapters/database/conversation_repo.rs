use crate::adapters::database::records::{ConversationRecord, UnreadRecord};
use crate::domain::conversation::{Conversation, NewConversation, canonical_pair};
use crate::error::Result;
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, participant_low, participant_high, client_id, photographer_id, \
     last_message_id, last_message_text, last_message_time, is_active, is_blocked, blocked_by, created_at, updated_at";

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts the conversation for the pair unless one already exists.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn insert_if_absent(&self, conn: &mut PgConnection, draft: &NewConversation) -> Result<()> {
        let (low, high) = canonical_pair(draft.participants.0, draft.participants.1);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, client_id, photographer_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (participant_low, participant_high) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(low)
        .bind(high)
        .bind(draft.roles.client)
        .bind(draft.roles.photographer)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_pair(&self, conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let (low, high) = canonical_pair(a, b);
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE participant_low = $1 AND participant_high = $2"
        ))
        .bind(low)
        .bind(high)
        .fetch_optional(&mut *conn)
        .await?;

        self.hydrate_one(conn, record).await
    }

    /// Loads a conversation, optionally taking a row lock for the rest of the transaction.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        for_update: bool,
    ) -> Result<Option<Conversation>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1{lock}"
        ))
        .bind(conversation_id)
        .fetch_optional(&mut *conn)
        .await?;

        self.hydrate_one(conn, record).await
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE (participant_low = $1 OR participant_high = $1) AND is_active
            ORDER BY updated_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let unread = self.unread_rows(conn, &ids).await?;

        Ok(records.into_iter().map(|record| record.into_domain(&unread)).collect())
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, text))]
    pub(crate) async fn set_last_message(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        message_id: Option<Uuid>,
        text: Option<&str>,
        time: Option<OffsetDateTime>,
        touch: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = $2,
                last_message_text = $3,
                last_message_time = $4,
                updated_at = CASE WHEN $5 THEN NOW() ELSE updated_at END
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(text)
        .bind(time)
        .bind(touch)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn increment_unread(&self, conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (conversation_id, user_id)
            DO UPDATE SET unread_count = conversation_unread.unread_count + 1
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn decrement_unread(&self, conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE conversation_unread
            SET unread_count = GREATEST(unread_count - 1, 0)
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn reset_unread(&self, conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
            VALUES ($1, $2, 0)
            ON CONFLICT (conversation_id, user_id)
            DO UPDATE SET unread_count = 0
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    async fn hydrate_one(&self, conn: &mut PgConnection, record: Option<ConversationRecord>) -> Result<Option<Conversation>> {
        let Some(record) = record else {
            return Ok(None);
        };
        let unread = self.unread_rows(conn, &[record.id]).await?;
        Ok(Some(record.into_domain(&unread)))
    }

    async fn unread_rows(&self, conn: &mut PgConnection, conversation_ids: &[Uuid]) -> Result<Vec<UnreadRecord>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, UnreadRecord>(
            r#"
            SELECT conversation_id, user_id, unread_count
            FROM conversation_unread
            WHERE conversation_id = ANY($1)
            "#,
        )
        .bind(conversation_ids)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }
}
