use crate::error::Result;
use crate::types::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One inbound event from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub user_id: UserId,
    pub username: String,
    pub kind: InteractionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionKind {
    /// Slash command without the leading `/`.
    Command { name: String },
    /// Button press. `id` must be acknowledged with `answer_interaction`.
    Callback { id: String, data: String },
    Document { file_id: String, file_name: String },
    Contact { phone: String },
    Text { text: String },
}

impl Interaction {
    pub fn new(user_id: UserId, username: impl Into<String>, kind: InteractionKind) -> Self {
        Self {
            user_id,
            username: username.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyboard {
    /// Buttons attached to the message, row by row.
    Inline(Vec<Vec<InlineButton>>),
    /// One-time reply keyboard asking the user to share their phone number.
    RequestContact { label: String },
    /// Hide a previously shown reply keyboard.
    Remove,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_text(&self, user_id: UserId, text: &str, keyboard: Option<&Keyboard>)
        -> Result<()>;

    async fn send_document(
        &self,
        user_id: UserId,
        file_name: &str,
        document: &[u8],
        caption: &str,
    ) -> Result<()>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_interaction(&self, interaction_id: &str) -> Result<()>;

    async fn download_document(&self, file_id: &str) -> Result<Vec<u8>>;
}
