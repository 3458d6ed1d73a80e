pub mod client_store;
pub mod order_store;
pub mod repository;
pub mod state_store;
pub mod ticket_store;

pub use client_store::{Client, ClientStore};
pub use order_store::OrderStore;
pub use repository::OrderRepository;
pub use state_store::{MemoryStateStore, SqliteStateStore, StateStore};
pub use ticket_store::TicketStore;

use crate::error::{FunnelError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FunnelError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Orders. The row id is the global sequence number used for prizes.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                selections TEXT,
                prize TEXT,
                paid_amount INTEGER,
                contact TEXT,
                address TEXT,
                finalized INTEGER NOT NULL DEFAULT 0,
                voided INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, finalized)",
            [],
        )?;

        // Accepted receipts
        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                receipt_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                order_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                issuer_id INTEGER NOT NULL,
                document_digest TEXT UNIQUE,
                accepted_at INTEGER NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tickets (
                user_id INTEGER NOT NULL,
                ticket_id INTEGER NOT NULL,
                receipt_id TEXT NOT NULL,
                paid INTEGER NOT NULL DEFAULT 1,
                checked INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (receipt_id) REFERENCES receipts(receipt_id),
                UNIQUE (user_id, ticket_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS clients (
                user_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                contact TEXT,
                address TEXT,
                first_seen INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Ephemeral conversation state, used when no external cache is configured
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversation_state (
                user_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// True when `err` is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
