use crate::error::{FunnelError, Result};
use crate::receipt::ReceiptRejection;
use crate::storage::{is_constraint_violation, Storage};
use crate::types::{AcceptedPayment, LotoTicket, OrderId, UserId};
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;

/// Accepted receipts and the lottery tickets issued for them.
pub struct TicketStore<'a> {
    storage: &'a Storage,
}

impl<'a> TicketStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn is_receipt_used(&self, receipt_id: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE receipt_id = ?1",
            params![receipt_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    pub async fn is_document_used(&self, digest: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE document_digest = ?1",
            params![digest],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Record the receipt, mark the order paid and insert its tickets in
    /// one transaction. Nothing is written if any step fails, except that an
    /// order whose receipt was already used is voided.
    pub async fn record_acceptance(
        &self,
        order_id: OrderId,
        payment: &AcceptedPayment,
        tickets: &[LotoTicket],
    ) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();

        let user_id: UserId = match tx.query_row(
            "SELECT user_id FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        ) {
            Ok(user_id) => user_id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(FunnelError::OrderNotFound(order_id))
            }
            Err(e) => return Err(e.into()),
        };

        let inserted = tx.execute(
            "INSERT INTO receipts (receipt_id, user_id, order_id, amount, issuer_id, document_digest, accepted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payment.receipt_id,
                user_id,
                order_id,
                payment.amount as i64,
                payment.issuer_id as i64,
                payment.document_digest,
                now,
            ],
        );
        if let Err(e) = inserted {
            if !is_constraint_violation(&e) {
                return Err(e.into());
            }
            drop(tx);

            // The order was opened for this receipt only; close it unpaid.
            conn.execute(
                "UPDATE orders SET voided = 1, updated_at = ?1 WHERE id = ?2 AND paid_amount IS NULL",
                params![now, order_id],
            )?;
            tracing::info!(
                "Receipt {} already used, order {} voided",
                payment.receipt_id,
                order_id
            );
            return Err(ReceiptRejection::AlreadyUsed {
                receipt_id: payment.receipt_id.clone(),
            }
            .into());
        }

        tx.execute(
            "UPDATE orders SET paid_amount = ?1, updated_at = ?2 WHERE id = ?3",
            params![payment.amount as i64, now, order_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tickets (user_id, ticket_id, receipt_id, paid, checked, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            )?;
            for ticket in tickets {
                stmt.execute(params![
                    ticket.user_id,
                    ticket.ticket_id,
                    ticket.receipt_id,
                    ticket.paid,
                    now,
                ])
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        FunnelError::TicketCollision {
                            user_id: ticket.user_id,
                        }
                    } else {
                        e.into()
                    }
                })?;
            }
        }

        tx.commit()?;

        tracing::info!(
            "Receipt {} accepted for order {}: {} tickets",
            payment.receipt_id,
            order_id,
            tickets.len()
        );
        Ok(())
    }

    pub async fn ticket_ids_for_user(&self, user_id: UserId) -> Result<HashSet<u32>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare("SELECT ticket_id FROM tickets WHERE user_id = ?1")?;
        let id_iter = stmt.query_map(params![user_id], |row| row.get::<_, u32>(0))?;

        let mut ids = HashSet::new();
        for id in id_iter {
            ids.insert(id?);
        }

        Ok(ids)
    }

    pub async fn tickets_for_receipt(&self, receipt_id: &str) -> Result<Vec<LotoTicket>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT ticket_id, user_id, receipt_id, paid FROM tickets
             WHERE receipt_id = ?1 ORDER BY rowid",
        )?;
        let ticket_iter = stmt.query_map(params![receipt_id], |row| {
            Ok(LotoTicket {
                ticket_id: row.get(0)?,
                user_id: row.get(1)?,
                receipt_id: row.get(2)?,
                paid: row.get(3)?,
            })
        })?;

        let mut tickets = Vec::new();
        for ticket in ticket_iter {
            tickets.push(ticket?);
        }

        Ok(tickets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OrderStore;
    use tempfile::tempdir;

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("tickets.db")).await.unwrap();
        (dir, storage)
    }

    fn payment(receipt_id: &str, digest: Option<&str>) -> AcceptedPayment {
        AcceptedPayment {
            receipt_id: receipt_id.to_string(),
            amount: 18_900,
            issuer_id: 870_304_301_209,
            document_digest: digest.map(str::to_string),
        }
    }

    fn tickets(user_id: UserId, receipt_id: &str, ids: &[u32]) -> Vec<LotoTicket> {
        ids.iter()
            .map(|&ticket_id| LotoTicket {
                ticket_id,
                user_id,
                receipt_id: receipt_id.to_string(),
                paid: true,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_used_receipt_is_reported_as_used() {
        let (_dir, storage) = storage().await;
        let order = OrderStore::new(&storage).create_order(1, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        assert!(!store.is_receipt_used("QR-1").await.unwrap());

        store
            .record_acceptance(order, &payment("QR-1", Some("d1")), &tickets(1, "QR-1", &[10_000_001]))
            .await
            .unwrap();

        assert!(store.is_receipt_used("QR-1").await.unwrap());
        assert!(!store.is_receipt_used("QR-2").await.unwrap());
        assert!(store.is_document_used("d1").await.unwrap());
        assert!(!store.is_document_used("d2").await.unwrap());
    }

    #[tokio::test]
    async fn test_acceptance_marks_order_paid() {
        let (_dir, storage) = storage().await;
        let orders = OrderStore::new(&storage);
        let order = orders.create_order(1, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        store
            .record_acceptance(
                order,
                &payment("QR-1", None),
                &tickets(1, "QR-1", &[10_000_001, 10_000_002, 10_000_003]),
            )
            .await
            .unwrap();

        assert_eq!(orders.load_order(order).await.unwrap().paid_amount, Some(18_900));
        assert_eq!(store.tickets_for_receipt("QR-1").await.unwrap().len(), 3);
        assert_eq!(
            store.ticket_ids_for_user(1).await.unwrap(),
            [10_000_001, 10_000_002, 10_000_003].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_second_acceptance_of_receipt_is_rejected() {
        let (_dir, storage) = storage().await;
        let orders = OrderStore::new(&storage);
        let first = orders.create_order(1, 1).await.unwrap();
        let second = orders.create_order(2, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        store
            .record_acceptance(first, &payment("QR-1", None), &tickets(1, "QR-1", &[10_000_001]))
            .await
            .unwrap();

        let err = store
            .record_acceptance(second, &payment("QR-1", None), &tickets(2, "QR-1", &[20_000_001]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FunnelError::Rejected(ReceiptRejection::AlreadyUsed { .. })
        ));

        // Nothing from the rejected attempt was written.
        assert!(!orders.load_order(second).await.unwrap().is_paid());
        assert!(store.ticket_ids_for_user(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_losing_receipt_race_is_voided() {
        let (_dir, storage) = storage().await;
        let orders = OrderStore::new(&storage);
        let winner = orders.create_order(1, 1).await.unwrap();
        let loser = orders.create_order(2, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        store
            .record_acceptance(winner, &payment("QR-1", None), &tickets(1, "QR-1", &[10_000_001]))
            .await
            .unwrap();
        store
            .record_acceptance(loser, &payment("QR-1", None), &tickets(2, "QR-1", &[20_000_001]))
            .await
            .unwrap_err();

        let order = orders.load_order(loser).await.unwrap();
        assert!(order.voided);
        assert!(!order.finalized);
        assert!(orders.open_orders_for_user(2).await.unwrap().is_empty());

        // The winning order is untouched.
        assert!(!orders.load_order(winner).await.unwrap().voided);
        assert_eq!(orders.open_orders_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_document_under_new_receipt_id_is_rejected() {
        let (_dir, storage) = storage().await;
        let orders = OrderStore::new(&storage);
        let first = orders.create_order(1, 1).await.unwrap();
        let second = orders.create_order(1, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        store
            .record_acceptance(first, &payment("QR-1", Some("same")), &[])
            .await
            .unwrap();
        let err = store
            .record_acceptance(second, &payment("QR-1b", Some("same")), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FunnelError::Rejected(ReceiptRejection::AlreadyUsed { .. })
        ));
    }

    #[tokio::test]
    async fn test_ticket_collision_rolls_back() {
        let (_dir, storage) = storage().await;
        let orders = OrderStore::new(&storage);
        let first = orders.create_order(1, 1).await.unwrap();
        let second = orders.create_order(1, 1).await.unwrap();
        let store = TicketStore::new(&storage);

        store
            .record_acceptance(first, &payment("QR-1", None), &tickets(1, "QR-1", &[10_000_001]))
            .await
            .unwrap();

        let err = store
            .record_acceptance(
                second,
                &payment("QR-2", None),
                &tickets(1, "QR-2", &[10_000_002, 10_000_001]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::TicketCollision { user_id: 1 }));

        assert!(!store.is_receipt_used("QR-2").await.unwrap());
        assert!(!orders.load_order(second).await.unwrap().is_paid());
        assert_eq!(store.ticket_ids_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_dir, storage) = storage().await;
        let err = TicketStore::new(&storage)
            .record_acceptance(99, &payment("QR-1", None), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::OrderNotFound(99)));
    }
}
