use super::gateway::{ChatGateway, Interaction, InteractionKind, Keyboard};
use super::messages::{self, AcceptanceSummary};
use super::state::ConversationState;
use crate::config::FunnelConfig;
use crate::error::{FunnelError, Result};
use crate::lottery::{mint_tickets, ticket_count};
use crate::receipt::{document_digest, extract_fields, reconcile, ReceiptRejection, TextExtractor};
use crate::storage::{OrderRepository, StateStore};
use crate::types::{AcceptedPayment, LotoTicket, OrderId, PrizeTier, UserId};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Attempts at minting a ticket batch that does not clash with the user's
/// existing tickets.
const MAX_MINT_ATTEMPTS: usize = 3;

/// A receipt document being processed for a user in `AwaitingPayment`.
struct Upload<'a> {
    user_id: UserId,
    username: &'a str,
    quantity: u32,
    file_name: &'a str,
}

pub struct FunnelMachine {
    config: Arc<FunnelConfig>,
    chat: Arc<dyn ChatGateway>,
    extractor: Arc<dyn TextExtractor>,
    states: Arc<dyn StateStore>,
    orders: Arc<dyn OrderRepository>,
}

impl FunnelMachine {
    pub fn new(
        config: FunnelConfig,
        chat: Arc<dyn ChatGateway>,
        extractor: Arc<dyn TextExtractor>,
        states: Arc<dyn StateStore>,
        orders: Arc<dyn OrderRepository>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            chat,
            extractor,
            states,
            orders,
        })
    }

    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    /// Process one inbound interaction to completion.
    ///
    /// User-facing rejections are answered and return `Ok`. Errors are
    /// returned only for faults the user could not be told about.
    pub async fn handle(&self, interaction: Interaction) -> Result<()> {
        let Interaction {
            user_id,
            username,
            kind,
        } = interaction;

        if let Err(e) = self.orders.register_visit(user_id, &username).await {
            tracing::warn!("Failed to register visit of user {}: {}", user_id, e);
        }

        let state = self.load_state(user_id).await;
        tracing::debug!("User {} is in stage {}", user_id, state.stage_name());

        match kind {
            InteractionKind::Command { name } => {
                if name != "start" {
                    tracing::debug!("Unknown command /{} from user {}", name, user_id);
                }
                self.send_promo(user_id).await;
                Ok(())
            }
            InteractionKind::Callback { id, data } => {
                if let Err(e) = self
                    .with_timeout("callback answer", self.chat.answer_interaction(&id))
                    .await
                {
                    tracing::warn!("Failed to answer callback {}: {}", id, e);
                }
                self.on_callback(user_id, &data, &state).await;
                Ok(())
            }
            InteractionKind::Document { file_id, file_name } => {
                match state.require_awaiting_payment() {
                    Ok(quantity) => {
                        let upload = Upload {
                            user_id,
                            username: &username,
                            quantity,
                            file_name: &file_name,
                        };
                        self.process_receipt(&upload, &file_id).await
                    }
                    Err(_) if state.is_paid() => {
                        self.prompt_contact(user_id).await;
                        Ok(())
                    }
                    Err(e) => {
                        tracing::info!("Ignoring document from user {}: {}", user_id, e);
                        Ok(())
                    }
                }
            }
            InteractionKind::Contact { phone } => {
                self.on_contact(user_id, &phone, &state).await;
                Ok(())
            }
            InteractionKind::Text { text } => {
                self.on_text(user_id, &username, &text, state).await;
                Ok(())
            }
        }
    }

    /// Stored state, or `Start` when missing, expired, corrupt or unreachable.
    pub async fn load_state(&self, user_id: UserId) -> ConversationState {
        match self.states.load(user_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                let state = ConversationState::default();
                self.save_state(user_id, &state).await;
                state
            }
            Err(e @ FunnelError::CorruptState(_)) => {
                tracing::warn!("Resetting state of user {}: {}", user_id, e);
                let state = ConversationState::default();
                self.save_state(user_id, &state).await;
                state
            }
            Err(e) => {
                tracing::warn!(
                    "State store unavailable for user {}, continuing with default state: {}",
                    user_id,
                    e
                );
                ConversationState::default()
            }
        }
    }

    async fn save_state(&self, user_id: UserId, state: &ConversationState) {
        if let Err(e) = self
            .states
            .save(user_id, state, self.config.state_ttl)
            .await
        {
            tracing::warn!(
                "Failed to save state {} for user {}: {}",
                state.stage_name(),
                user_id,
                e
            );
        }
    }

    async fn on_callback(&self, user_id: UserId, data: &str, state: &ConversationState) {
        if data == messages::BUY_CALLBACK {
            if state.is_paid() {
                self.prompt_contact(user_id).await;
                return;
            }
            self.save_state(user_id, &ConversationState::CountSelection)
                .await;
            self.send(
                user_id,
                messages::CHOOSE_QUANTITY,
                Some(&messages::quantity_keyboard(self.config.max_quantity)),
            )
            .await;
        } else if let Some(quantity) =
            messages::parse_quantity_callback(data, self.config.max_quantity)
        {
            if state.is_paid() {
                self.prompt_contact(user_id).await;
                return;
            }
            self.save_state(user_id, &ConversationState::AwaitingPayment { quantity })
                .await;
            tracing::info!("User {} chose {} units", user_id, quantity);

            let total = u64::from(quantity) * self.config.unit_cost;
            self.send(
                user_id,
                &messages::payment_prompt(total),
                Some(&messages::payment_keyboard(&self.config.payment_url)),
            )
            .await;
        } else {
            tracing::debug!("Ignoring callback {:?} from user {}", data, user_id);
        }
    }

    async fn on_contact(&self, user_id: UserId, phone: &str, state: &ConversationState) {
        let (quantity, order_id, _) = match state.require_awaiting_contact() {
            Ok(fields) => fields,
            Err(e) => {
                tracing::info!("Ignoring contact from user {}: {}", user_id, e);
                return;
            }
        };

        let phone = phone.trim();
        if phone.is_empty() {
            self.prompt_contact(user_id).await;
            return;
        }

        let next = ConversationState::AwaitingContact {
            quantity,
            order_id,
            contact: Some(phone.to_string()),
        };
        self.save_state(user_id, &next).await;
        tracing::info!("User {} shared contact", user_id);

        self.send(user_id, messages::ASK_ADDRESS, Some(&Keyboard::Remove))
            .await;
    }

    async fn on_text(&self, user_id: UserId, username: &str, text: &str, state: ConversationState) {
        match state {
            ConversationState::AwaitingContact {
                quantity,
                order_id,
                contact: Some(contact),
            } => {
                let address = text.trim();
                if address.is_empty() {
                    self.send(user_id, messages::ASK_ADDRESS, None).await;
                    return;
                }
                self.finalize(user_id, username, quantity, order_id, &contact, address)
                    .await;
            }
            ConversationState::AwaitingContact { contact: None, .. } => {
                self.prompt_contact(user_id).await;
            }
            ConversationState::AwaitingPayment { quantity } => {
                let total = u64::from(quantity) * self.config.unit_cost;
                self.send(
                    user_id,
                    &messages::payment_prompt(total),
                    Some(&messages::payment_keyboard(&self.config.payment_url)),
                )
                .await;
            }
            ConversationState::Start | ConversationState::CountSelection => {
                self.send_promo(user_id).await;
            }
        }
    }

    async fn process_receipt(&self, upload: &Upload<'_>, file_id: &str) -> Result<()> {
        let user_id = upload.user_id;

        if !is_pdf(upload.file_name) {
            self.send(user_id, messages::PDF_ONLY, None).await;
            return Ok(());
        }

        let document = match self
            .with_timeout("document download", self.chat.download_document(file_id))
            .await
        {
            Ok(document) => document,
            Err(e) => {
                self.send(user_id, messages::TRY_AGAIN_LATER, None).await;
                return Err(e);
            }
        };
        let digest = document_digest(&document);

        let text = match self
            .with_timeout(
                "text extraction",
                self.extractor.extract_text(upload.file_name, &document),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Could not read receipt of user {}: {}", user_id, e);
                self.send(user_id, messages::UNREADABLE_RECEIPT, None).await;
                return Ok(());
            }
        };

        let fields = extract_fields(&text);
        tracing::debug!("Receipt fields for user {}: {:?}", user_id, fields);

        let reconciliation = match reconcile(&fields, upload.quantity, &self.config) {
            Ok(reconciliation) => reconciliation,
            Err(rejection) => {
                self.reject(user_id, &rejection).await;
                return Ok(());
            }
        };

        if let Some(rejection) = self
            .check_unused(&reconciliation.receipt.receipt_id, &digest)
            .await
        {
            self.reject(user_id, &rejection).await;
            return Ok(());
        }

        let payment = reconciliation.into_payment(Some(digest));
        self.accept(upload, &payment, document).await;
        Ok(())
    }

    /// Fast-path uniqueness check. The insert constraint remains authoritative.
    async fn check_unused(&self, receipt_id: &str, digest: &str) -> Option<ReceiptRejection> {
        let already_used = ReceiptRejection::AlreadyUsed {
            receipt_id: receipt_id.to_string(),
        };

        match self.orders.is_receipt_identifier_used(receipt_id).await {
            Ok(true) => return Some(already_used),
            Ok(false) => {}
            Err(e) => tracing::warn!("Receipt pre-check failed for {}: {}", receipt_id, e),
        }

        match self.orders.is_document_used(digest).await {
            Ok(true) => Some(already_used),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Document pre-check failed for {}: {}", receipt_id, e);
                None
            }
        }
    }

    async fn reject(&self, user_id: UserId, rejection: &ReceiptRejection) {
        tracing::info!("Receipt from user {} rejected: {}", user_id, rejection);

        let keyboard = match rejection {
            ReceiptRejection::WrongPrice { .. } => {
                Some(messages::quantity_keyboard(self.config.max_quantity))
            }
            _ => None,
        };
        self.send(user_id, &messages::rejection(rejection), keyboard.as_ref())
            .await;
    }

    /// Persist the payment, then move the user on regardless of whether
    /// persistence succeeded. Persistence faults go to the operators.
    async fn accept(&self, upload: &Upload<'_>, payment: &AcceptedPayment, document: Vec<u8>) {
        let user_id = upload.user_id;

        let (order_id, tickets, prize) = match self.orders.create_order(user_id, upload.quantity).await {
            Ok(order_id) => match self.record_with_retry(order_id, upload, payment).await {
                Ok(tickets) => {
                    let prize = self.assign_prize(order_id, user_id, payment).await;
                    (Some(order_id), tickets, prize)
                }
                Err(FunnelError::Rejected(rejection)) => {
                    self.reject(user_id, &rejection).await;
                    return;
                }
                Err(e) => {
                    self.report_persistence_failure(user_id, payment, &e);
                    (Some(order_id), Vec::new(), None)
                }
            },
            Err(e) => {
                self.report_persistence_failure(user_id, payment, &e);
                (None, Vec::new(), None)
            }
        };

        let next = ConversationState::AwaitingContact {
            quantity: upload.quantity,
            order_id,
            contact: None,
        };
        self.save_state(user_id, &next).await;

        tracing::info!(
            "User {} paid {} for {} units (order {:?}, {} tickets)",
            user_id,
            payment.amount,
            upload.quantity,
            order_id,
            tickets.len()
        );

        self.send(
            user_id,
            &messages::receipt_accepted(tickets.len(), prize),
            Some(&messages::contact_keyboard()),
        )
        .await;

        let caption = messages::operator_acceptance_caption(&AcceptanceSummary {
            user_id,
            username: upload.username,
            quantity: upload.quantity,
            amount: payment.amount,
            receipt_id: &payment.receipt_id,
            order_id,
            prize,
        });
        self.notify_operators_document(upload.file_name.to_string(), document, caption);
    }

    async fn record_with_retry(
        &self,
        order_id: OrderId,
        upload: &Upload<'_>,
        payment: &AcceptedPayment,
    ) -> Result<Vec<LotoTicket>> {
        let count = ticket_count(upload.quantity, self.config.tickets_per_unit);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let taken = self.orders.ticket_ids_for_user(upload.user_id).await?;
            let tickets = {
                let mut rng = rand::thread_rng();
                mint_tickets(&mut rng, upload.user_id, &payment.receipt_id, count, &taken)
            };

            match self
                .orders
                .record_payment_and_tickets(order_id, payment, &tickets)
                .await
            {
                Ok(()) => return Ok(tickets),
                Err(FunnelError::TicketCollision { user_id }) if attempt < MAX_MINT_ATTEMPTS => {
                    tracing::warn!(
                        "Ticket id collision for user {}, re-minting (attempt {})",
                        user_id,
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn assign_prize(
        &self,
        order_id: OrderId,
        user_id: UserId,
        payment: &AcceptedPayment,
    ) -> Option<PrizeTier> {
        let sequence = u64::try_from(order_id).unwrap_or(0);
        let tier = self.config.prize_schedule.determine(sequence);

        match self.orders.assign_prize(order_id, tier).await {
            Ok(prize) => Some(prize),
            Err(e) => {
                tracing::error!("Failed to assign prize to order {}: {}", order_id, e);
                self.notify_operators_text(messages::operator_persistence_failure(
                    user_id,
                    &payment.receipt_id,
                    &e.to_string(),
                ));
                None
            }
        }
    }

    fn report_persistence_failure(&self, user_id: UserId, payment: &AcceptedPayment, e: &FunnelError) {
        tracing::error!(
            "Failed to record receipt {} for user {}: {}",
            payment.receipt_id,
            user_id,
            e
        );
        self.notify_operators_text(messages::operator_persistence_failure(
            user_id,
            &payment.receipt_id,
            &e.to_string(),
        ));
    }

    async fn finalize(
        &self,
        user_id: UserId,
        username: &str,
        quantity: u32,
        order_id: Option<OrderId>,
        contact: &str,
        address: &str,
    ) {
        match order_id {
            Some(order_id) => {
                if let Err(e) = self.orders.finalize_order(order_id, contact, address).await {
                    tracing::error!("Failed to finalize order {}: {}", order_id, e);
                    self.notify_operators_text(messages::operator_finalize_failure(
                        user_id,
                        order_id,
                        &e.to_string(),
                    ));
                }
            }
            None => tracing::warn!("User {} finished without a recorded order", user_id),
        }

        if let Err(e) = self.orders.save_contact(user_id, contact, address).await {
            tracing::warn!("Failed to save contact of user {}: {}", user_id, e);
        }

        if let Err(e) = self.states.delete(user_id).await {
            tracing::warn!("Failed to clear state of user {}: {}", user_id, e);
        }
        tracing::info!("User {} completed order {:?}", user_id, order_id);

        self.spawn_send(
            vec![user_id],
            messages::ORDER_COMPLETE.to_string(),
            Some(Keyboard::Remove),
        );
        self.notify_operators_text(messages::operator_order_summary(
            user_id, username, order_id, quantity, contact, address,
        ));
    }

    async fn send_promo(&self, user_id: UserId) {
        self.send(user_id, messages::PROMO, Some(&messages::promo_keyboard()))
            .await;
    }

    async fn prompt_contact(&self, user_id: UserId) {
        self.send(
            user_id,
            messages::SHARE_CONTACT,
            Some(&messages::contact_keyboard()),
        )
        .await;
    }

    async fn send(&self, user_id: UserId, text: &str, keyboard: Option<&Keyboard>) {
        if let Err(e) = self
            .with_timeout("send message", self.chat.send_text(user_id, text, keyboard))
            .await
        {
            tracing::warn!("Failed to send message to user {}: {}", user_id, e);
        }
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.io_timeout, operation)
            .await
            .map_err(|_| {
                FunnelError::timeout(format!(
                    "{} exceeded {}s",
                    what,
                    self.config.io_timeout.as_secs_f32()
                ))
            })?
    }

    fn notify_operators_text(&self, text: String) {
        self.spawn_send(self.config.operator_ids.clone(), text, None);
    }

    fn spawn_send(&self, recipients: Vec<UserId>, text: String, keyboard: Option<Keyboard>) {
        if recipients.is_empty() {
            return;
        }
        let chat = Arc::clone(&self.chat);
        let timeout = self.config.io_timeout;

        tokio::spawn(async move {
            for recipient in recipients {
                let send = chat.send_text(recipient, &text, keyboard.as_ref());
                match tokio::time::timeout(timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("Failed to notify {}: {}", recipient, e),
                    Err(_) => tracing::error!("Timed out notifying {}", recipient),
                }
            }
        });
    }

    fn notify_operators_document(&self, file_name: String, document: Vec<u8>, caption: String) {
        if self.config.operator_ids.is_empty() {
            return;
        }
        let chat = Arc::clone(&self.chat);
        let operators = self.config.operator_ids.clone();
        let timeout = self.config.io_timeout;

        tokio::spawn(async move {
            for operator in operators {
                let send = chat.send_document(operator, &file_name, &document, &caption);
                match tokio::time::timeout(timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!("Failed to send receipt to operator {}: {}", operator, e)
                    }
                    Err(_) => tracing::error!("Timed out sending receipt to operator {}", operator),
                }
            }
        });
    }
}

fn is_pdf(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
