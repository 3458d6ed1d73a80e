//! User and operator facing texts and keyboards.

use super::gateway::{InlineButton, Keyboard};
use crate::receipt::ReceiptRejection;
use crate::types::{OrderId, PrizeTier, UserId};

pub const BUY_CALLBACK: &str = "buy";
pub const COUNT_CALLBACK_PREFIX: &str = "count_";

const QUANTITY_ROW_WIDTH: u32 = 5;

pub const PROMO: &str = "🧴 Парфюм жиынтығын сатып алып, 10мл немесе 30мл парфюм, бриллиант жүзік \
                         және 100 000 теңге ақшалай сыйлықтың біріне ие болыңыз!";
pub const CHOOSE_QUANTITY: &str = "🧪 Парфюм санын таңдаңыз";
pub const PDF_ONLY: &str = "❌ Қате! Тек қана PDF 📄 форматындағы файлдарды қабылдаймыз.";
pub const UNREADABLE_RECEIPT: &str = "❌ Дұрыс емес форматтағы чек! 📄 Қайталап көріңіз.";
pub const TRY_AGAIN_LATER: &str = "⏳ Чекті өңдеу мүмкін болмады. Біраздан кейін қайталап жіберіңіз.";
pub const ALREADY_USED: &str = "⚠️ Бұл чек бұрын төленіп қойылған! 💳 ✅";
pub const WRONG_BIN: &str = "❌ Қате банк картасы! 💳\n\n\
                             🏦 Тек біздің серіктес банк картасымен төлем жасауға болады.\n\
                             📋 Дұрыс банк картасын пайдаланып қайталап көріңіз!";
pub const SHARE_CONTACT_BUTTON: &str = "📲 Контактіні бөлісу";
pub const SHARE_CONTACT: &str =
    "Cізбен кері байланысқа шығу үшін контактіні 📲 бөлісу түймесін басыңыз.";
pub const ASK_ADDRESS: &str = "✅ Контактіңіз сәтті алынды! 😊\n\
                               🚚 Парфюм жинақты қай мекен-жайға жеткізу керек екенін жазыңыз.";
pub const ORDER_COMPLETE: &str =
    "🎉 Тапсырысыңыз қабылданды! Жақын арада сізбен байланысамыз. Рахмет!";

pub fn promo_keyboard() -> Keyboard {
    Keyboard::Inline(vec![vec![InlineButton::callback("🛍 Сатып алу", BUY_CALLBACK)]])
}

/// Grid of `1..=max` quantity buttons, five per row.
pub fn quantity_keyboard(max: u32) -> Keyboard {
    let buttons: Vec<InlineButton> = (1..=max)
        .map(|n| InlineButton::callback(n.to_string(), format!("{}{}", COUNT_CALLBACK_PREFIX, n)))
        .collect();

    Keyboard::Inline(
        buttons
            .chunks(QUANTITY_ROW_WIDTH as usize)
            .map(|row| row.to_vec())
            .collect(),
    )
}

/// Quantity from a `count_N` callback, if `N` is within `1..=max`.
pub fn parse_quantity_callback(data: &str, max: u32) -> Option<u32> {
    let quantity: u32 = data.strip_prefix(COUNT_CALLBACK_PREFIX)?.parse().ok()?;
    (1..=max).contains(&quantity).then_some(quantity)
}

pub fn payment_prompt(total: u64) -> String {
    format!(
        "✅ Тамаша! Енді төмендегі сілтемеге өтіп {} теңге төлем жасап, \
         төлемді растайтын чекті PDF форматында ботқа кері жіберіңіз.",
        total
    )
}

pub fn payment_keyboard(payment_url: &str) -> Keyboard {
    Keyboard::Inline(vec![vec![InlineButton::url("💳 Төлем жасау", payment_url)]])
}

pub fn contact_keyboard() -> Keyboard {
    Keyboard::RequestContact {
        label: SHARE_CONTACT_BUTTON.to_string(),
    }
}

pub fn wrong_price(predicted_quantity: u64) -> String {
    format!(
        "⚠️ Дұрыс емес сумма! 💰\n\n\
         🔄 Көрсетілген сумаға сәйкес төлеңіз!\n\
         📦 Немесе жиынтық суммасына сәйкес жиынтық санын түймелер таңдаңыз.\n\n\
         Сіздің жиынтық саны: {}",
        predicted_quantity
    )
}

/// Reply text for a rejected receipt.
pub fn rejection(rejection: &ReceiptRejection) -> String {
    match rejection {
        ReceiptRejection::ParseFailure(_) => UNREADABLE_RECEIPT.to_string(),
        ReceiptRejection::WrongPrice {
            predicted_quantity, ..
        } => wrong_price(*predicted_quantity),
        ReceiptRejection::WrongBin { .. } => WRONG_BIN.to_string(),
        ReceiptRejection::AlreadyUsed { .. } => ALREADY_USED.to_string(),
    }
}

pub fn receipt_accepted(ticket_count: usize, prize: Option<PrizeTier>) -> String {
    let mut text = String::from("✅ Чек PDF сәтті қабылданды! 🎉\n\n");
    if ticket_count > 0 {
        text.push_str(&format!("🎟 Сіздің лото билеттеріңіз: {}\n", ticket_count));
    }
    if let Some(prize) = prize {
        text.push_str(&format!("🎁 Сыйлығыңыз: {}\n", prize.display_name()));
    }
    text.push_str(
        "\n📞 Сізбен кері байланысқа шығу үшін төмендегі\n\
         📲 Контактіні бөлісу түймесін 👇 міндетті басыңыз.",
    );
    text
}

pub struct AcceptanceSummary<'a> {
    pub user_id: UserId,
    pub username: &'a str,
    pub quantity: u32,
    pub amount: u64,
    pub receipt_id: &'a str,
    pub order_id: Option<OrderId>,
    pub prize: Option<PrizeTier>,
}

pub fn operator_acceptance_caption(summary: &AcceptanceSummary<'_>) -> String {
    format!(
        "✅ Сәтті төлем жасалды! 🎉\n\n\
         👤 UserId: {} ({})\n\
         🧴 Косметика саны: {}\n\
         💰 Төлем суммасы: {} ₸\n\
         🧾 QR: {}\n\
         📦 Тапсырыс: {}\n\
         🎁 Сыйлық: {}",
        summary.user_id,
        summary.username,
        summary.quantity,
        summary.amount,
        summary.receipt_id,
        summary
            .order_id
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "-".to_string()),
        summary.prize.map(|p| p.display_name()).unwrap_or("-"),
    )
}

pub fn operator_persistence_failure(user_id: UserId, receipt_id: &str, error: &str) -> String {
    format!(
        "⚠️ Қабылданған чекті сақтау қатесі!\n\n👤 UserId: {}\n🧾 QR: {}\n❗ {}",
        user_id, receipt_id, error
    )
}

pub fn operator_finalize_failure(user_id: UserId, order_id: OrderId, error: &str) -> String {
    format!(
        "⚠️ Тапсырысты аяқтау қатесі!\n\n👤 UserId: {}\n📦 Тапсырыс: #{}\n❗ {}",
        user_id, order_id, error
    )
}

pub fn operator_order_summary(
    user_id: UserId,
    username: &str,
    order_id: Option<OrderId>,
    quantity: u32,
    contact: &str,
    address: &str,
) -> String {
    format!(
        "📦 Жаңа тапсырыс {}\n\n👤 {} ({})\n🧴 Саны: {}\n📞 {}\n📍 {}",
        order_id
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "(not saved)".to_string()),
        username,
        user_id,
        quantity,
        contact,
        address
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::gateway::ButtonAction;

    #[test]
    fn test_quantity_keyboard_is_six_by_five() {
        let Keyboard::Inline(rows) = quantity_keyboard(30) else {
            panic!("expected inline keyboard");
        };
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|row| row.len() == 5));
        assert_eq!(
            rows[5][4].action,
            ButtonAction::Callback("count_30".to_string())
        );
    }

    #[test]
    fn test_quantity_callback_bounds() {
        assert_eq!(parse_quantity_callback("count_1", 30), Some(1));
        assert_eq!(parse_quantity_callback("count_30", 30), Some(30));
        assert_eq!(parse_quantity_callback("count_0", 30), None);
        assert_eq!(parse_quantity_callback("count_31", 30), None);
        assert_eq!(parse_quantity_callback("count_x", 30), None);
        assert_eq!(parse_quantity_callback("buy", 30), None);
    }

    #[test]
    fn test_wrong_price_mentions_prediction() {
        let text = rejection(&ReceiptRejection::WrongPrice {
            expected: 94_500,
            actual: 50_000,
            predicted_quantity: 2,
        });
        assert!(text.ends_with(": 2"));
    }

    #[test]
    fn test_operator_failure_texts_name_the_subject() {
        let text = operator_persistence_failure(77, "QR-1", "disk full");
        assert!(text.starts_with("⚠️ Қабылданған чекті сақтау қатесі!"));
        assert!(text.contains("77") && text.contains("QR-1") && text.contains("disk full"));

        let text = operator_finalize_failure(77, 12, "locked");
        assert!(text.starts_with("⚠️ Тапсырысты аяқтау қатесі!"));
        assert!(text.contains("#12") && text.contains("locked"));
    }

    #[test]
    fn test_accepted_message_names_prize() {
        let text = receipt_accepted(15, Some(PrizeTier::Diamond));
        assert!(text.contains("15"));
        assert!(text.contains(PrizeTier::Diamond.display_name()));
        assert!(!receipt_accepted(3, None).contains("🎁"));
        assert!(!receipt_accepted(0, None).contains("🎟"));
    }
}
