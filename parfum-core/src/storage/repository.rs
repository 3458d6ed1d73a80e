use crate::error::Result;
use crate::selections::Selections;
use crate::storage::{ClientStore, OrderStore, Storage, TicketStore};
use crate::types::{AcceptedPayment, LotoTicket, Order, OrderId, PrizeTier, UserId};
use async_trait::async_trait;
use std::collections::HashSet;

/// Durable order, receipt and ticket persistence used by the funnel.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, user_id: UserId, quantity: u32) -> Result<OrderId>;

    async fn open_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// True when a receipt with this identifier was ever accepted.
    async fn is_receipt_identifier_used(&self, receipt_id: &str) -> Result<bool>;

    async fn is_document_used(&self, digest: &str) -> Result<bool>;

    async fn ticket_ids_for_user(&self, user_id: UserId) -> Result<HashSet<u32>>;

    /// Atomically record the receipt, the paid amount and all tickets.
    ///
    /// A receipt accepted before fails with `ReceiptRejection::AlreadyUsed`.
    /// A clashing ticket id fails with `FunnelError::TicketCollision`.
    async fn record_payment_and_tickets(
        &self,
        order_id: OrderId,
        payment: &AcceptedPayment,
        tickets: &[LotoTicket],
    ) -> Result<()>;

    /// Write `tier` if the order has no prize yet; returns the stored prize.
    async fn assign_prize(&self, order_id: OrderId, tier: PrizeTier) -> Result<PrizeTier>;

    async fn finalize_order(&self, order_id: OrderId, contact: &str, address: &str) -> Result<()>;

    async fn update_selections(&self, order_id: OrderId, selections: &Selections) -> Result<()>;

    async fn register_visit(&self, user_id: UserId, username: &str) -> Result<()>;

    async fn save_contact(&self, user_id: UserId, contact: &str, address: &str) -> Result<()>;
}

#[async_trait]
impl OrderRepository for Storage {
    async fn create_order(&self, user_id: UserId, quantity: u32) -> Result<OrderId> {
        OrderStore::new(self).create_order(user_id, quantity).await
    }

    async fn open_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        OrderStore::new(self).open_orders_for_user(user_id).await
    }

    async fn is_receipt_identifier_used(&self, receipt_id: &str) -> Result<bool> {
        TicketStore::new(self).is_receipt_used(receipt_id).await
    }

    async fn is_document_used(&self, digest: &str) -> Result<bool> {
        TicketStore::new(self).is_document_used(digest).await
    }

    async fn ticket_ids_for_user(&self, user_id: UserId) -> Result<HashSet<u32>> {
        TicketStore::new(self).ticket_ids_for_user(user_id).await
    }

    async fn record_payment_and_tickets(
        &self,
        order_id: OrderId,
        payment: &AcceptedPayment,
        tickets: &[LotoTicket],
    ) -> Result<()> {
        TicketStore::new(self)
            .record_acceptance(order_id, payment, tickets)
            .await
    }

    async fn assign_prize(&self, order_id: OrderId, tier: PrizeTier) -> Result<PrizeTier> {
        OrderStore::new(self).assign_prize(order_id, tier).await
    }

    async fn finalize_order(&self, order_id: OrderId, contact: &str, address: &str) -> Result<()> {
        OrderStore::new(self)
            .finalize_order(order_id, contact, address)
            .await
    }

    async fn update_selections(&self, order_id: OrderId, selections: &Selections) -> Result<()> {
        OrderStore::new(self)
            .update_selections(order_id, selections)
            .await
    }

    async fn register_visit(&self, user_id: UserId, username: &str) -> Result<()> {
        ClientStore::new(self).register_visit(user_id, username).await
    }

    async fn save_contact(&self, user_id: UserId, contact: &str, address: &str) -> Result<()> {
        ClientStore::new(self)
            .save_contact(user_id, contact, address)
            .await
    }
}
