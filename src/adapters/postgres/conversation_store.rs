//! PostgreSQL implementation of ConversationStore.
//!
//! Appends run in a transaction holding a row-level lock on the
//! conversation, so concurrent appends to one conversation serialize:
//! none are lost or reordered, identifiers stay unique, and `updated_at`
//! always ends up equal to the newest message's timestamp. The new
//! message's timestamp is clamped to strictly exceed the previous
//! `updated_at`, keeping the history totally ordered even when appends
//! land within one clock tick.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

use crate::domain::conversation::{
    Conversation, ConversationId, ConversationRecord, ConversationSummary, Message, MessageId,
    Role,
};
use crate::ports::{AppendOutcome, ConversationStore, NewMessage, StoreError};

/// PostgreSQL implementation of ConversationStore.
#[derive(Clone)]
pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    /// Creates a store over an existing pool handle.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(conversation.id.as_uuid())
        .bind(&conversation.title)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to insert conversation: {e}")))?;

        Ok(conversation)
    }

    async fn list_conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.title, c.created_at, c.updated_at,
                   COUNT(m.id) AS message_count
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            GROUP BY c.id, c.title, c.created_at, c.updated_at
            ORDER BY c.updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to list conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(ConversationSummary {
                    conversation: row_to_conversation(row)?,
                    message_count: row.get::<i64, _>("message_count") as u64,
                })
            })
            .collect()
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationRecord, StoreError> {
        let conv_row = sqlx::query(
            r#"
            SELECT id, title, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to fetch conversation: {e}")))?
        .ok_or(StoreError::NotFound(id))?;

        let message_rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, sources, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to fetch messages: {e}")))?;

        let messages = message_rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ConversationRecord {
            conversation: row_to_conversation(&conv_row)?,
            messages,
        })
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<AppendOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;

        // Lock the conversation row; concurrent appends queue here.
        let locked = sqlx::query(
            r#"
            SELECT updated_at
            FROM conversations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(conversation_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to lock conversation: {e}")))?
        .ok_or(StoreError::NotFound(conversation_id))?;

        let previous_updated_at: DateTime<Utc> = locked.get("updated_at");

        if let Some(key) = &message.turn_key {
            let existing = sqlx::query(
                r#"
                SELECT id, conversation_id, role, content, sources, created_at
                FROM messages
                WHERE conversation_id = $1 AND turn_key = $2 AND role = $3
                "#,
            )
            .bind(conversation_id.as_uuid())
            .bind(key.as_str())
            .bind(message.role.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to check turn key: {e}")))?;

            if let Some(row) = existing {
                let recorded = row_to_message(&row)?;
                tx.commit()
                    .await
                    .map_err(|e| StoreError::Database(format!("Failed to commit: {e}")))?;
                return Ok(AppendOutcome::AlreadyRecorded(recorded));
            }
        }

        // Clamp so the history stays totally ordered under same-tick
        // appends or a backwards clock step.
        let now = Utc::now();
        let created_at = if now > previous_updated_at {
            now
        } else {
            previous_updated_at + Duration::microseconds(1)
        };

        let persisted = Message {
            id: MessageId::new(),
            conversation_id,
            role: message.role,
            content: message.content,
            sources: message.sources,
            created_at,
        };

        let sources = serde_json::to_value(&persisted.sources)
            .map_err(|e| StoreError::Database(format!("Failed to encode sources: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, sources, turn_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(persisted.id.as_uuid())
        .bind(conversation_id.as_uuid())
        .bind(persisted.role.as_str())
        .bind(&persisted.content)
        .bind(&sources)
        .bind(message.turn_key.as_ref().map(|k| k.as_str()))
        .bind(persisted.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to insert message: {e}")))?;

        sqlx::query(
            r#"
            UPDATE conversations SET updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(conversation_id.as_uuid())
        .bind(persisted.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to advance updated_at: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to commit: {e}")))?;

        Ok(AppendOutcome::Appended(persisted))
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET title = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to rename conversation: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete conversation: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

// === Row Mapping ===

fn row_to_conversation(row: &sqlx::postgres::PgRow) -> Result<Conversation, StoreError> {
    Ok(Conversation {
        id: ConversationId::from_uuid(row.get("id")),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<Message, StoreError> {
    let role: String = row.get("role");
    let role: Role = role
        .parse()
        .map_err(|e: String| StoreError::Database(format!("Invalid stored role: {e}")))?;

    let sources: serde_json::Value = row.get("sources");
    let sources: Vec<String> = serde_json::from_value(sources)
        .map_err(|e| StoreError::Database(format!("Invalid stored sources: {e}")))?;

    Ok(Message {
        id: MessageId::from_uuid(row.get("id")),
        conversation_id: ConversationId::from_uuid(row.get("conversation_id")),
        role,
        content: row.get("content"),
        sources,
        created_at: row.get("created_at"),
    })
}
