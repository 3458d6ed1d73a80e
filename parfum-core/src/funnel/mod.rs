//! Purchase conversation: quantity choice, receipt upload, contact and
//! address collection.

pub mod gateway;
pub mod machine;
pub mod messages;
pub mod state;

pub use gateway::{ButtonAction, ChatGateway, InlineButton, Interaction, InteractionKind, Keyboard};
pub use machine::FunnelMachine;
pub use state::ConversationState;

#[cfg(test)]
pub(crate) mod testing {
    use super::gateway::{ChatGateway, Keyboard};
    use crate::error::{FunnelError, Result};
    use crate::receipt::TextExtractor;
    use crate::types::UserId;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text {
            user_id: UserId,
            text: String,
            keyboard: Option<Keyboard>,
        },
        Document {
            user_id: UserId,
            file_name: String,
            caption: String,
        },
        Answer(String),
    }

    /// Gateway that records everything sent and serves canned downloads.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<Sent>>,
        pub files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl RecordingGateway {
        pub fn with_file(file_id: &str, bytes: &[u8]) -> Self {
            let gateway = Self::default();
            gateway.add_file(file_id, bytes);
            gateway
        }

        pub fn add_file(&self, file_id: &str, bytes: &[u8]) {
            self.files.lock().insert(file_id.to_string(), bytes.to_vec());
        }

        pub fn texts_to(&self, user_id: UserId) -> Vec<(String, Option<Keyboard>)> {
            self.sent
                .lock()
                .iter()
                .filter_map(|sent| match sent {
                    Sent::Text {
                        user_id: to,
                        text,
                        keyboard,
                    } if *to == user_id => Some((text.clone(), keyboard.clone())),
                    _ => None,
                })
                .collect()
        }

        pub fn last_text_to(&self, user_id: UserId) -> Option<(String, Option<Keyboard>)> {
            self.texts_to(user_id).pop()
        }

        pub fn documents_to(&self, user_id: UserId) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter_map(|sent| match sent {
                    Sent::Document {
                        user_id: to,
                        caption,
                        ..
                    } if *to == user_id => Some(caption.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Wait for fire-and-forget sends to land.
        pub async fn wait_for<F: Fn(&Self) -> bool>(&self, condition: F) -> bool {
            for _ in 0..100 {
                if condition(self) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            condition(self)
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn send_text(
            &self,
            user_id: UserId,
            text: &str,
            keyboard: Option<&Keyboard>,
        ) -> Result<()> {
            self.sent.lock().push(Sent::Text {
                user_id,
                text: text.to_string(),
                keyboard: keyboard.cloned(),
            });
            Ok(())
        }

        async fn send_document(
            &self,
            user_id: UserId,
            file_name: &str,
            _document: &[u8],
            caption: &str,
        ) -> Result<()> {
            self.sent.lock().push(Sent::Document {
                user_id,
                file_name: file_name.to_string(),
                caption: caption.to_string(),
            });
            Ok(())
        }

        async fn answer_interaction(&self, interaction_id: &str) -> Result<()> {
            self.sent.lock().push(Sent::Answer(interaction_id.to_string()));
            Ok(())
        }

        async fn download_document(&self, file_id: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .get(file_id)
                .cloned()
                .ok_or_else(|| FunnelError::chat(format!("no such file: {}", file_id)))
        }
    }

    /// Extractor that treats the document bytes as the extracted text.
    pub struct EchoExtractor;

    #[async_trait]
    impl TextExtractor for EchoExtractor {
        async fn extract_text(&self, _file_name: &str, document: &[u8]) -> Result<String> {
            Ok(String::from_utf8_lossy(document).into_owned())
        }
    }
}
