use crate::error::{FunnelError, Result};
use crate::selections::Selections;
use crate::storage::Storage;
use crate::types::{Order, OrderId, PrizeTier, UserId};
use chrono::Utc;
use rusqlite::{params, Row};

const ORDER_COLUMNS: &str = "id, user_id, quantity, selections, prize, paid_amount, contact, address, finalized, created_at, voided";

pub struct OrderStore<'a> {
    storage: &'a Storage,
}

impl<'a> OrderStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Insert a new open order and return its sequence number.
    pub async fn create_order(&self, user_id: UserId, quantity: u32) -> Result<OrderId> {
        let conn = self.storage.get_connection().await;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO orders (user_id, quantity, finalized, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![user_id, quantity, now],
        )?;

        let order_id = conn.last_insert_rowid();
        tracing::info!("Created order {} for user {} ({} units)", order_id, user_id, quantity);
        Ok(order_id)
    }

    pub async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        let conn = self.storage.get_connection().await;

        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        match conn.query_row(&sql, params![order_id], order_from_row) {
            Ok(order) => Ok(order),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(FunnelError::OrderNotFound(order_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Orders of a user that are neither finalized nor voided, newest first.
    pub async fn open_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let conn = self.storage.get_connection().await;

        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = ?1 AND finalized = 0 AND voided = 0 ORDER BY id DESC",
            ORDER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let order_iter = stmt.query_map(params![user_id], order_from_row)?;

        let mut orders = Vec::new();
        for order in order_iter {
            orders.push(order?);
        }

        Ok(orders)
    }

    /// Store `tier` unless the order already has a prize. Returns the prize
    /// the order ends up with.
    pub async fn assign_prize(&self, order_id: OrderId, tier: PrizeTier) -> Result<PrizeTier> {
        let conn = self.storage.get_connection().await;

        let updated = conn.execute(
            "UPDATE orders SET prize = ?1, updated_at = ?2 WHERE id = ?3 AND prize IS NULL",
            params![tier.as_str(), Utc::now().timestamp(), order_id],
        )?;
        if updated == 1 {
            tracing::info!("Order {} won {}", order_id, tier);
            return Ok(tier);
        }

        let existing: Option<String> = match conn.query_row(
            "SELECT prize FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        ) {
            Ok(prize) => prize,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(FunnelError::OrderNotFound(order_id))
            }
            Err(e) => return Err(e.into()),
        };

        existing
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(FunnelError::internal)
    }

    pub async fn finalize_order(&self, order_id: OrderId, contact: &str, address: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;

        let updated = conn.execute(
            "UPDATE orders SET contact = ?1, address = ?2, finalized = 1, updated_at = ?3
             WHERE id = ?4",
            params![contact, address, Utc::now().timestamp(), order_id],
        )?;
        if updated == 0 {
            return Err(FunnelError::OrderNotFound(order_id));
        }

        tracing::info!("Order {} finalized", order_id);
        Ok(())
    }

    pub async fn update_selections(&self, order_id: OrderId, selections: &Selections) -> Result<()> {
        let order = self.load_order(order_id).await?;

        let selected = selections.used_quantity();
        if selected > order.quantity {
            return Err(FunnelError::SelectionExceedsQuantity {
                selected,
                quantity: order.quantity,
            });
        }

        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE orders SET selections = ?1, updated_at = ?2 WHERE id = ?3",
            params![selections.to_string(), Utc::now().timestamp(), order_id],
        )?;

        Ok(())
    }
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let prize = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(raw.parse::<PrizeTier>().map_err(|_| {
            rusqlite::Error::InvalidColumnType(4, "prize".to_string(), rusqlite::types::Type::Text)
        })?),
        None => None,
    };
    let paid_amount: Option<i64> = row.get(5)?;
    let finalized: i64 = row.get(8)?;
    let voided: i64 = row.get(10)?;

    Ok(Order {
        sequence_number: row.get(0)?,
        user_id: row.get(1)?,
        quantity: row.get(2)?,
        selections: row.get(3)?,
        prize,
        paid_amount: paid_amount.map(|a| a as u64),
        contact: row.get(6)?,
        address: row.get(7)?,
        finalized: finalized != 0,
        voided: voided != 0,
        created_at: chrono::DateTime::from_timestamp(row.get(9)?, 0).unwrap_or_else(Utc::now),
    })
}
