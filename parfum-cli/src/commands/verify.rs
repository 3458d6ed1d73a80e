use crate::config::AppConfig;
use comfy_table::{presets::UTF8_FULL, Table};
use parfum_core::receipt::{extract_fields, reconcile};
use parfum_core::{FunnelError, OrderRepository, ReceiptRejection, Result, Storage};
use std::path::Path;

/// Run an already extracted receipt text through field extraction,
/// reconciliation and the reuse check, without recording anything.
pub async fn handle_verify(
    config: &AppConfig,
    storage: &Storage,
    text_path: &Path,
    quantity: u32,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(text_path).await?;
    let fields = extract_fields(&raw);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Field"]);
    for (index, field) in fields.iter().enumerate() {
        table.add_row(vec![index.to_string(), field.clone()]);
    }
    println!("{}", table);

    let reconciliation = match reconcile(&fields, quantity, &config.funnel) {
        Ok(reconciliation) => reconciliation,
        Err(rejection) => {
            if let ReceiptRejection::WrongPrice {
                predicted_quantity, ..
            } = &rejection
            {
                println!("Amount matches a quantity of {}", predicted_quantity);
            }
            return Err(FunnelError::Rejected(rejection));
        }
    };

    println!("Layout:     {:?}", reconciliation.receipt.layout);
    println!("Receipt ID: {}", reconciliation.receipt.receipt_id);
    if reconciliation.observed_amount != reconciliation.amount {
        println!(
            "Amount:     {} (snapped from {})",
            reconciliation.amount, reconciliation.observed_amount
        );
    } else {
        println!("Amount:     {}", reconciliation.amount);
    }
    println!("Issuer:     {}", reconciliation.issuer_id);

    if storage
        .is_receipt_identifier_used(&reconciliation.receipt.receipt_id)
        .await?
    {
        return Err(ReceiptRejection::AlreadyUsed {
            receipt_id: reconciliation.receipt.receipt_id,
        }
        .into());
    }

    println!();
    println!("Receipt is valid for {} units", quantity);
    Ok(())
}
