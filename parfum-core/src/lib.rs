//! Parfum core - receipt-verified purchase funnel for a chat bot
//!
//! A user picks a quantity, pays through an external link and uploads the
//! payment receipt. The receipt is read, reconciled against the expected
//! price and issuer, checked for reuse, and turned into lottery tickets and
//! a sequence-based prize before contact and address are collected.

pub mod config;
pub mod error;
pub mod funnel;
pub mod lottery;
pub mod receipt;
pub mod selections;
pub mod storage;
pub mod telegram;
pub mod types;

pub use config::{FunnelConfig, PriceBand};
pub use error::{FunnelError, Result};
pub use funnel::{ChatGateway, ConversationState, FunnelMachine, Interaction, InteractionKind};
pub use lottery::{determine_prize, PrizeSchedule};
pub use receipt::{CommandExtractor, ReceiptRejection, TextExtractor};
pub use selections::Selections;
pub use storage::{MemoryStateStore, OrderRepository, SqliteStateStore, StateStore, Storage};
pub use telegram::TelegramGateway;
pub use types::{Order, OrderId, PrizeTier, UserId};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::messages;
    use crate::funnel::testing::{EchoExtractor, RecordingGateway};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn interaction(kind: InteractionKind) -> Interaction {
        Interaction::new(500, "dana", kind)
    }

    fn callback(data: &str) -> Interaction {
        interaction(InteractionKind::Callback {
            id: "cb".to_string(),
            data: data.to_string(),
        })
    }

    #[tokio::test]
    async fn test_receipt_to_tickets_end_to_end() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("parfum.db")).await.unwrap());
        let states = Arc::new(SqliteStateStore::new(storage.clone()));
        let chat = Arc::new(RecordingGateway::with_file(
            "receipt-1",
            r#"["success_marker","94,500 ₸","QR-ABC-123","870304301209"]"#.as_bytes(),
        ));

        let mut config = FunnelConfig::default();
        config.status_markers.push("success_marker".to_string());

        let machine = FunnelMachine::new(
            config,
            chat.clone(),
            Arc::new(EchoExtractor),
            states.clone(),
            storage.clone(),
        )
        .unwrap();

        machine
            .handle(interaction(InteractionKind::Command {
                name: "start".to_string(),
            }))
            .await
            .unwrap();
        machine.handle(callback(messages::BUY_CALLBACK)).await.unwrap();
        machine.handle(callback("count_5")).await.unwrap();
        machine
            .handle(interaction(InteractionKind::Document {
                file_id: "receipt-1".to_string(),
                file_name: "kaspi.pdf".to_string(),
            }))
            .await
            .unwrap();

        assert!(storage.is_receipt_identifier_used("QR-ABC-123").await.unwrap());

        let orders = storage.open_orders_for_user(500).await.unwrap();
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.quantity, 5);
        assert_eq!(order.paid_amount, Some(94_500));
        assert_eq!(order.prize, Some(determine_prize(order.sequence_number as u64)));

        let tickets = crate::storage::TicketStore::new(&storage)
            .tickets_for_receipt("QR-ABC-123")
            .await
            .unwrap();
        assert_eq!(tickets.len(), 15);
        assert!(tickets.iter().all(|t| t.user_id == 500 && t.paid));
        assert!(tickets
            .iter()
            .all(|t| lottery::TICKET_ID_RANGE.contains(&t.ticket_id)));

        let state = states.load(500).await.unwrap().unwrap();
        assert_eq!(
            state,
            ConversationState::AwaitingContact {
                quantity: 5,
                order_id: Some(order.sequence_number),
                contact: None,
            }
        );
    }
}
