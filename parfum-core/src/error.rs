use crate::receipt::ReceiptRejection;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FunnelError>;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error(transparent)]
    Rejected(#[from] ReceiptRejection),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Never carries the request URL, which embeds the bot token.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Chat gateway error: {0}")]
    Chat(String),

    #[error("Text extraction error: {0}")]
    Extraction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Conversation is in stage {found}, expected {expected}")]
    StageMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Corrupt conversation state: {0}")]
    CorruptState(String),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Ticket id collision for user {user_id}")]
    TicketCollision { user_id: i64 },

    #[error("Selection of {selected} items exceeds order quantity {quantity}")]
    SelectionExceedsQuantity { selected: u32, quantity: u32 },

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FunnelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl FunnelError {
    pub fn chat(msg: impl Into<String>) -> Self {
        Self::Chat(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
