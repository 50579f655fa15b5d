//! In-memory implementation of ConversationStore for testing.
//!
//! Deterministic, dependency-free stand-in for the PostgreSQL store with
//! the same append semantics: serialized appends, monotonic `updated_at`,
//! strict message ordering, and turn-key idempotence. This adapter is for
//! **testing only**; production code uses `PostgresConversationStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::domain::conversation::{
    Conversation, ConversationId, ConversationRecord, ConversationSummary, Message, MessageId,
    Role,
};
use crate::ports::{AppendOutcome, ConversationStore, NewMessage, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    conversation: Conversation,
    messages: Vec<Message>,
    /// (turn key, role) -> message, backing append idempotence.
    turn_keys: HashMap<(String, Role), MessageId>,
}

/// In-memory conversation store for tests.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<ConversationId, Entry>>,
    failures_armed: AtomicBool,
    appends_before_failure: AtomicUsize,
}

impl InMemoryConversationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Makes every append after the next `successes` ones fail with a
    /// database error, for persistence-failure tests.
    pub fn fail_after_appends(&self, successes: usize) {
        self.appends_before_failure
            .store(successes, Ordering::SeqCst);
        self.failures_armed.store(true, Ordering::SeqCst);
    }

    /// Disarms injected failures.
    pub fn clear_failures(&self) {
        self.failures_armed.store(false, Ordering::SeqCst);
    }

    /// Total number of messages across all conversations.
    pub async fn message_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.messages.len())
            .sum()
    }

    fn check_injected_failure(&self) -> Result<(), StoreError> {
        if !self.failures_armed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let remaining = self.appends_before_failure.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(StoreError::Database("injected append failure".to_string()));
        }
        self.appends_before_failure
            .store(remaining - 1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        self.entries.write().await.insert(
            conversation.id,
            Entry {
                conversation: conversation.clone(),
                messages: Vec::new(),
                turn_keys: HashMap::new(),
            },
        );
        Ok(conversation)
    }

    async fn list_conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, StoreError> {
        let entries = self.entries.read().await;
        let mut summaries: Vec<ConversationSummary> = entries
            .values()
            .map(|entry| ConversationSummary {
                conversation: entry.conversation.clone(),
                message_count: entry.messages.len() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        summaries.truncate(limit as usize);
        Ok(summaries)
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationRecord, StoreError> {
        let entries = self.entries.read().await;
        let entry = entries.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(ConversationRecord {
            conversation: entry.conversation.clone(),
            messages: entry.messages.clone(),
        })
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<AppendOutcome, StoreError> {
        // The write lock serializes concurrent appends, mirroring the
        // row-level lock of the PostgreSQL store.
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&conversation_id)
            .ok_or(StoreError::NotFound(conversation_id))?;

        if let Some(key) = &message.turn_key {
            let dedup_key = (key.as_str().to_string(), message.role);
            if let Some(existing_id) = entry.turn_keys.get(&dedup_key) {
                let existing = entry
                    .messages
                    .iter()
                    .find(|m| m.id == *existing_id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::Database("turn key points at a missing message".to_string())
                    })?;
                return Ok(AppendOutcome::AlreadyRecorded(existing));
            }
        }

        self.check_injected_failure()?;

        // Clamp so appends stay strictly ordered even within one tick.
        let now = Utc::now();
        let created_at = if now > entry.conversation.updated_at {
            now
        } else {
            entry.conversation.updated_at + Duration::microseconds(1)
        };

        let persisted = Message {
            id: MessageId::new(),
            conversation_id,
            role: message.role,
            content: message.content,
            sources: message.sources,
            created_at,
        };
        if let Some(key) = &message.turn_key {
            entry
                .turn_keys
                .insert((key.as_str().to_string(), persisted.role), persisted.id);
        }
        entry.messages.push(persisted.clone());
        entry.conversation.updated_at = created_at;
        Ok(AppendOutcome::Appended(persisted))
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.conversation.title = title.to_string();
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(&id).ok_or(StoreError::NotFound(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::TurnKey;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_then_get_returns_empty_history() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("First").await.unwrap();
        let record = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(record.conversation.title, "First");
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_conversation_is_not_found() {
        let store = InMemoryConversationStore::new();
        let result = store.get_conversation(ConversationId::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn append_advances_updated_at_to_message_timestamp() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Chat").await.unwrap();

        let outcome = store
            .append_message(conversation.id, NewMessage::user("hello"))
            .await
            .unwrap();
        assert!(outcome.was_appended());

        let record = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(
            record.conversation.updated_at,
            record.messages[0].created_at
        );
        assert!(record.conversation.updated_at >= conversation.updated_at);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_is_not_found() {
        let store = InMemoryConversationStore::new();
        let result = store
            .append_message(ConversationId::new(), NewMessage::user("hello"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn same_turn_key_and_role_appends_at_most_once() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Chat").await.unwrap();
        let key = TurnKey::derive(conversation.id, "hello", 0);

        let first = store
            .append_message(
                conversation.id,
                NewMessage::assistant("Hi", Vec::new()).with_turn_key(key.clone()),
            )
            .await
            .unwrap();
        let second = store
            .append_message(
                conversation.id,
                NewMessage::assistant("Hi", Vec::new()).with_turn_key(key),
            )
            .await
            .unwrap();

        assert!(first.was_appended());
        assert!(!second.was_appended());
        assert_eq!(second.message().id, first.message().id);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn same_turn_key_with_different_roles_appends_both() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Chat").await.unwrap();
        let key = TurnKey::derive(conversation.id, "hello", 0);

        store
            .append_message(
                conversation.id,
                NewMessage::user("hello").with_turn_key(key.clone()),
            )
            .await
            .unwrap();
        store
            .append_message(
                conversation.id,
                NewMessage::assistant("Hi", Vec::new()).with_turn_key(key),
            )
            .await
            .unwrap();

        assert_eq!(store.message_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_appends_all_succeed_with_distinct_ids_in_order() {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = store.create_conversation("Busy").await.unwrap();

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            let id = conversation.id;
            handles.push(tokio::spawn(async move {
                store
                    .append_message(id, NewMessage::user(format!("message {n}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().was_appended());
        }

        let record = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(record.messages.len(), 16);

        let mut ids: Vec<_> = record.messages.iter().map(|m| m.id).collect();
        ids.sort_by_key(|id| *id.as_uuid());
        ids.dedup();
        assert_eq!(ids.len(), 16);

        for pair in record.messages.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
        assert_eq!(
            record.conversation.updated_at,
            record.messages.last().unwrap().created_at
        );
    }

    #[tokio::test]
    async fn list_orders_by_updated_at_descending_and_clamps() {
        let store = InMemoryConversationStore::new();
        let first = store.create_conversation("First").await.unwrap();
        let second = store.create_conversation("Second").await.unwrap();

        store
            .append_message(first.id, NewMessage::user("bump"))
            .await
            .unwrap();

        let summaries = store.list_conversations(10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].conversation.id, first.id);
        assert_eq!(summaries[0].message_count, 1);
        assert_eq!(summaries[1].conversation.id, second.id);

        let clamped = store.list_conversations(1).await.unwrap();
        assert_eq!(clamped.len(), 1);
    }

    #[tokio::test]
    async fn rename_changes_title_but_not_updated_at() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Old").await.unwrap();

        store
            .rename_conversation(conversation.id, "New")
            .await
            .unwrap();

        let record = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(record.conversation.title, "New");
        assert_eq!(record.conversation.updated_at, conversation.updated_at);
    }

    #[tokio::test]
    async fn delete_removes_conversation_and_messages() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Gone").await.unwrap();
        store
            .append_message(conversation.id, NewMessage::user("hello"))
            .await
            .unwrap();

        store.delete_conversation(conversation.id).await.unwrap();
        assert!(matches!(
            store.get_conversation(conversation.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn injected_failures_fire_after_configured_successes() {
        let store = InMemoryConversationStore::new();
        let conversation = store.create_conversation("Flaky").await.unwrap();
        store.fail_after_appends(1);

        assert!(store
            .append_message(conversation.id, NewMessage::user("ok"))
            .await
            .is_ok());
        assert!(matches!(
            store
                .append_message(conversation.id, NewMessage::user("fails"))
                .await,
            Err(StoreError::Database(_))
        ));

        store.clear_failures();
        assert!(store
            .append_message(conversation.id, NewMessage::user("ok again"))
            .await
            .is_ok());
    }
}
