//! Telegram Bot API adapter for the funnel's chat gateway.

use crate::error::{FunnelError, Result};
use crate::funnel::{ButtonAction, ChatGateway, Interaction, InteractionKind, Keyboard};
use crate::types::UserId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl User {
    fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.first_name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub document: Option<Document>,
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

impl Update {
    /// Map an update to a funnel interaction. Updates the funnel has no use
    /// for (edits, channel posts, stickers) map to `None`.
    pub fn into_interaction(self) -> Option<Interaction> {
        if let Some(callback) = self.callback_query {
            return Some(Interaction::new(
                callback.from.id,
                callback.from.display_name(),
                InteractionKind::Callback {
                    id: callback.id,
                    data: callback.data.unwrap_or_default(),
                },
            ));
        }

        let message = self.message?;
        let (user_id, username) = match &message.from {
            Some(user) => (user.id, user.display_name()),
            None => (message.chat.id, String::new()),
        };

        let kind = if let Some(document) = message.document {
            InteractionKind::Document {
                file_id: document.file_id,
                file_name: document.file_name.unwrap_or_default(),
            }
        } else if let Some(contact) = message.contact {
            InteractionKind::Contact {
                phone: contact.phone_number,
            }
        } else {
            let text = message.text?;
            match text.strip_prefix('/') {
                Some(command) => InteractionKind::Command {
                    name: command
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .split('@')
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                },
                None => InteractionKind::Text { text },
            }
        };

        Some(Interaction::new(user_id, username, kind))
    }
}

/// Bot API `reply_markup` object for a keyboard.
pub fn reply_markup(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Inline(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| match &button.action {
                            ButtonAction::Callback(data) => {
                                json!({ "text": button.text, "callback_data": data })
                            }
                            ButtonAction::Url(url) => json!({ "text": button.text, "url": url }),
                        })
                        .collect()
                })
                .collect();
            json!({ "inline_keyboard": rows })
        }
        Keyboard::RequestContact { label } => json!({
            "keyboard": [[{ "text": label, "request_contact": true }]],
            "resize_keyboard": true,
            "one_time_keyboard": true,
        }),
        Keyboard::Remove => json!({ "remove_keyboard": true }),
    }
}

pub struct TelegramGateway {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramGateway {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(FunnelError::config("bot token is empty"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R> {
        let response: ApiResponse<R> = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        unwrap_response(method, response)
    }

    /// Long-poll for updates with ids of at least `offset`.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let params = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message", "callback_query"],
        };

        // The HTTP request must outlive the server-side poll timeout.
        let response: ApiResponse<Vec<Update>> = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(timeout + Duration::from_secs(10))
            .json(&params)
            .send()
            .await?
            .json()
            .await?;

        unwrap_response("getUpdates", response)
    }
}

fn unwrap_response<R>(method: &str, response: ApiResponse<R>) -> Result<R> {
    if !response.ok {
        return Err(FunnelError::chat(format!(
            "{} failed: {}",
            method,
            response.description.unwrap_or_default()
        )));
    }
    response
        .result
        .ok_or_else(|| FunnelError::chat(format!("{} returned no result", method)))
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_text(&self, user_id: UserId, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut params = json!({ "chat_id": user_id, "text": text });
        if let Some(keyboard) = keyboard {
            params["reply_markup"] = reply_markup(keyboard);
        }

        let _: Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        user_id: UserId,
        file_name: &str,
        document: &[u8],
        caption: &str,
    ) -> Result<()> {
        let form = Form::new()
            .text("chat_id", user_id.to_string())
            .text("caption", caption.to_string())
            .part(
                "document",
                Part::bytes(document.to_vec()).file_name(file_name.to_string()),
            );

        let response: ApiResponse<Value> = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        unwrap_response("sendDocument", response).map(|_| ())
    }

    async fn answer_interaction(&self, interaction_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": interaction_id }),
            )
            .await?;
        Ok(())
    }

    async fn download_document(&self, file_id: &str) -> Result<Vec<u8>> {
        let file: File = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| FunnelError::chat(format!("file {} is not downloadable", file_id)))?;

        let bytes = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tracing::debug!("Downloaded {} ({} bytes)", file_path, bytes.len());
        Ok(bytes.to_vec())
    }
}
