use crate::error::Result;
use crate::funnel::ConversationState;
use crate::storage::Storage;
use crate::types::UserId;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::params;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Ephemeral per-user conversation state with expiry.
///
/// `load` returns `None` for missing or expired entries. A stored payload
/// that fails validation is reported as `FunnelError::CorruptState`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<Option<ConversationState>>;
    async fn save(&self, user_id: UserId, state: &ConversationState, ttl: Duration) -> Result<()>;
    async fn delete(&self, user_id: UserId) -> Result<()>;

    /// Drop every expired entry. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

fn expiry_from_now(ttl: Duration) -> i64 {
    let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_add(secs)
}

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<UserId, (i64, String)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, user_id: UserId) -> Result<Option<ConversationState>> {
        let entry = self.entries.read().get(&user_id).cloned();

        match entry {
            Some((expires_at, _)) if expires_at <= Utc::now().timestamp() => {
                self.entries.write().remove(&user_id);
                Ok(None)
            }
            Some((_, payload)) => ConversationState::from_json(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: UserId, state: &ConversationState, ttl: Duration) -> Result<()> {
        let payload = state.to_json()?;
        self.entries
            .write()
            .insert(user_id, (expiry_from_now(ttl), payload));
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<()> {
        self.entries.write().remove(&user_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        Ok(before - entries.len())
    }
}

/// State kept in the `conversation_state` table, surviving restarts.
pub struct SqliteStateStore {
    storage: Arc<Storage>,
}

impl SqliteStateStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, user_id: UserId) -> Result<Option<ConversationState>> {
        let conn = self.storage.get_connection().await;

        let row = conn.query_row(
            "SELECT payload, expires_at FROM conversation_state WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        );

        let (payload, expires_at) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if expires_at <= Utc::now().timestamp() {
            conn.execute(
                "DELETE FROM conversation_state WHERE user_id = ?1",
                params![user_id],
            )?;
            return Ok(None);
        }

        ConversationState::from_json(&payload).map(Some)
    }

    async fn save(&self, user_id: UserId, state: &ConversationState, ttl: Duration) -> Result<()> {
        let payload = state.to_json()?;
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO conversation_state (user_id, payload, expires_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, payload, expiry_from_now(ttl)],
        )?;

        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "DELETE FROM conversation_state WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let conn = self.storage.get_connection().await;
        let removed = conn.execute(
            "DELETE FROM conversation_state WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        if removed > 0 {
            tracing::debug!("Purged {} expired conversation states", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FunnelError;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    async fn exercise(store: &dyn StateStore) {
        assert_eq!(store.load(1).await.unwrap(), None);

        let state = ConversationState::AwaitingPayment { quantity: 4 };
        store.save(1, &state, DAY).await.unwrap();
        assert_eq!(store.load(1).await.unwrap(), Some(state));

        // Whole-state overwrite
        let next = ConversationState::AwaitingContact {
            quantity: 4,
            order_id: Some(1),
            contact: None,
        };
        store.save(1, &next, DAY).await.unwrap();
        assert_eq!(store.load(1).await.unwrap(), Some(next));

        store.delete(1).await.unwrap();
        assert_eq!(store.load(1).await.unwrap(), None);

        store
            .save(2, &ConversationState::CountSelection, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.load(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStateStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("state.db")).await.unwrap());
        exercise(&SqliteStateStore::new(storage)).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_reports_corrupt_payload() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("state.db")).await.unwrap());
        {
            let conn = storage.get_connection().await;
            conn.execute(
                "INSERT INTO conversation_state (user_id, payload, expires_at) VALUES (5, ?1, ?2)",
                params![r#"{"stage":"awaiting_contact","quantity":0}"#, i64::MAX],
            )
            .unwrap();
        }

        let store = SqliteStateStore::new(storage);
        let err = store.load(5).await.unwrap_err();
        assert!(matches!(err, FunnelError::CorruptState(_)));
    }

    async fn purge(store: &dyn StateStore) {
        store
            .save(1, &ConversationState::CountSelection, Duration::ZERO)
            .await
            .unwrap();
        store
            .save(2, &ConversationState::CountSelection, DAY)
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(
            store.load(2).await.unwrap(),
            Some(ConversationState::CountSelection)
        );
    }

    #[tokio::test]
    async fn test_sqlite_purge_expired() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("state.db")).await.unwrap());
        purge(&SqliteStateStore::new(storage)).await;
    }

    #[tokio::test]
    async fn test_memory_purge_evicts_abandoned_users() {
        let store = MemoryStateStore::new();
        purge(&store).await;

        for user_id in 100..1100 {
            store
                .save(user_id, &ConversationState::CountSelection, Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(store.entries.read().len(), 1001);

        assert_eq!(store.purge_expired().await.unwrap(), 1000);
        assert_eq!(store.entries.read().len(), 1);
    }
}
