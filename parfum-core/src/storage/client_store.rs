use crate::error::Result;
use crate::storage::Storage;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub user_id: UserId,
    pub username: String,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub first_seen: DateTime<Utc>,
}

pub struct ClientStore<'a> {
    storage: &'a Storage,
}

impl<'a> ClientStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Create the client row on first contact, refresh the username after.
    pub async fn register_visit(&self, user_id: UserId, username: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO clients (user_id, username, first_seen, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, updated_at = excluded.updated_at",
            params![user_id, username, now],
        )?;

        Ok(())
    }

    pub async fn save_contact(&self, user_id: UserId, contact: &str, address: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO clients (user_id, username, contact, address, first_seen, updated_at)
             VALUES (?1, '', ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET contact = excluded.contact,
                 address = excluded.address, updated_at = excluded.updated_at",
            params![user_id, contact, address, now],
        )?;

        Ok(())
    }

    pub async fn load_client(&self, user_id: UserId) -> Result<Option<Client>> {
        let conn = self.storage.get_connection().await;

        let client = conn.query_row(
            "SELECT user_id, username, contact, address, first_seen FROM clients WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Client {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    contact: row.get(2)?,
                    address: row.get(3)?,
                    first_seen: DateTime::from_timestamp(row.get(4)?, 0).unwrap_or_else(Utc::now),
                })
            },
        );

        match client {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_visit_then_contact() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("clients.db")).await.unwrap();
        let store = ClientStore::new(&storage);

        assert!(store.load_client(3).await.unwrap().is_none());

        store.register_visit(3, "aigerim").await.unwrap();
        let first_seen = store.load_client(3).await.unwrap().unwrap().first_seen;

        store.register_visit(3, "aigerim_k").await.unwrap();
        store.save_contact(3, "+77011234567", "Almaty, Abaya 1").await.unwrap();

        let client = store.load_client(3).await.unwrap().unwrap();
        assert_eq!(client.username, "aigerim_k");
        assert_eq!(client.contact.as_deref(), Some("+77011234567"));
        assert_eq!(client.address.as_deref(), Some("Almaty, Abaya 1"));
        assert_eq!(client.first_seen, first_seen);
    }
}
