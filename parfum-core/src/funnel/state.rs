use crate::error::{FunnelError, Result};
use crate::types::OrderId;
use serde::{Deserialize, Serialize};

/// Per-user position in the purchase conversation.
///
/// Each stage carries only the fields that stage needs. Stored states are
/// checked with [`ConversationState::validate`] when loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Start,
    CountSelection,
    AwaitingPayment {
        quantity: u32,
    },
    AwaitingContact {
        quantity: u32,
        /// `None` when the order could not be written at acceptance.
        order_id: Option<OrderId>,
        contact: Option<String>,
    },
}

impl ConversationState {
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::CountSelection => "count_selection",
            Self::AwaitingPayment { .. } => "awaiting_payment",
            Self::AwaitingContact { .. } => "awaiting_contact",
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            Self::Start | Self::CountSelection => 0,
            Self::AwaitingPayment { quantity } | Self::AwaitingContact { quantity, .. } => *quantity,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::AwaitingContact { .. })
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AwaitingPayment { quantity: 0 } | Self::AwaitingContact { quantity: 0, .. } => {
                Err(FunnelError::CorruptState(format!(
                    "{} with zero quantity",
                    self.stage_name()
                )))
            }
            Self::AwaitingContact {
                contact: Some(contact),
                ..
            } if contact.trim().is_empty() => Err(FunnelError::CorruptState(
                "awaiting_contact with blank contact".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Quantity of a state that must be waiting for a receipt.
    pub fn require_awaiting_payment(&self) -> Result<u32> {
        match self {
            Self::AwaitingPayment { quantity } => Ok(*quantity),
            other => Err(FunnelError::StageMismatch {
                expected: "awaiting_payment",
                found: other.stage_name(),
            }),
        }
    }

    pub fn require_awaiting_contact(&self) -> Result<(u32, Option<OrderId>, Option<&str>)> {
        match self {
            Self::AwaitingContact {
                quantity,
                order_id,
                contact,
            } => Ok((*quantity, *order_id, contact.as_deref())),
            other => Err(FunnelError::StageMismatch {
                expected: "awaiting_contact",
                found: other.stage_name(),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate a stored payload.
    pub fn from_json(payload: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(payload)
            .map_err(|e| FunnelError::CorruptState(format!("undecodable state: {}", e)))?;
        state.validate()?;
        Ok(state)
    }
}
