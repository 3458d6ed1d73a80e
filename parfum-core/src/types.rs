use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::selections::Selections;

/// Chat platform user id. Private chats share the id with the user.
pub type UserId = i64;

/// Row id of an order, doubling as its global sequence number.
pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeTier {
    Money,
    Diamond,
    ThirtyMl,
    TenMl,
}

impl PrizeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeTier::Money => "money",
            PrizeTier::Diamond => "diamond_ring",
            PrizeTier::ThirtyMl => "parfum_30ml",
            PrizeTier::TenMl => "parfum_10ml",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PrizeTier::Money => "💰 100,000 теңге",
            PrizeTier::Diamond => "💍 Бриллиант сақина",
            PrizeTier::ThirtyMl => "🧪 30мл парфюм",
            PrizeTier::TenMl => "🧪 10мл парфюм",
        }
    }
}

impl fmt::Display for PrizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrizeTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "money" => Ok(PrizeTier::Money),
            "diamond_ring" => Ok(PrizeTier::Diamond),
            "parfum_30ml" => Ok(PrizeTier::ThirtyMl),
            "parfum_10ml" => Ok(PrizeTier::TenMl),
            other => Err(format!("unknown prize tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub sequence_number: OrderId,
    pub user_id: UserId,
    pub quantity: u32,
    pub selections: Option<String>,
    pub prize: Option<PrizeTier>,
    pub paid_amount: Option<u64>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub finalized: bool,
    /// Closed without payment because its receipt was taken by another order.
    pub voided: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.paid_amount.is_some()
    }

    /// Units of the order not yet assigned to a concrete item.
    pub fn available_quantity(&self) -> u32 {
        let used = self
            .selections
            .as_deref()
            .map(|raw| Selections::parse(raw).used_quantity())
            .unwrap_or(0);
        self.quantity.saturating_sub(used)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotoTicket {
    pub ticket_id: u32,
    pub user_id: UserId,
    pub receipt_id: String,
    pub paid: bool,
}

/// A receipt that passed reconciliation, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPayment {
    pub receipt_id: String,
    pub amount: u64,
    pub issuer_id: u64,
    pub document_digest: Option<String>,
}
