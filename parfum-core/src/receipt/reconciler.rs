use super::{parse_amount, ReceiptFields, ReceiptRejection};
use crate::config::FunnelConfig;
use crate::types::AcceptedPayment;
use serde::{Deserialize, Serialize};

/// Outcome of a receipt that matched the expected price and issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub receipt: ReceiptFields,
    /// Amount as printed on the receipt.
    pub observed_amount: u64,
    /// Amount after price-band snapping.
    pub amount: u64,
    pub issuer_id: u64,
    pub quantity: u32,
}

impl Reconciliation {
    pub fn into_payment(self, document_digest: Option<String>) -> AcceptedPayment {
        AcceptedPayment {
            receipt_id: self.receipt.receipt_id,
            amount: self.amount,
            issuer_id: self.issuer_id,
            document_digest,
        }
    }
}

/// Check extracted receipt fields against the price of `quantity` units and
/// the issuer allow-list. Price is checked before issuer.
pub fn reconcile(
    fields: &[String],
    quantity: u32,
    config: &FunnelConfig,
) -> std::result::Result<Reconciliation, ReceiptRejection> {
    let receipt = ReceiptFields::from_fields(fields, &config.status_markers)?;

    let observed_amount = parse_amount(&receipt.amount)?;
    let amount = config.snap_amount(observed_amount);
    if amount != observed_amount {
        tracing::debug!("Snapped receipt amount {} to {}", observed_amount, amount);
    }

    let issuer_id = parse_amount(&receipt.issuer_id).ok();

    let expected = u64::from(quantity) * config.unit_cost;
    if amount != expected {
        return Err(ReceiptRejection::WrongPrice {
            expected,
            actual: amount,
            predicted_quantity: amount / config.unit_cost,
        });
    }

    let issuer_id = match issuer_id {
        Some(id) if config.is_allowed_issuer(id) => id,
        _ => {
            return Err(ReceiptRejection::WrongBin {
                issuer: receipt.issuer_id.clone(),
            })
        }
    };

    Ok(Reconciliation {
        receipt,
        observed_amount,
        amount,
        issuer_id,
        quantity,
    })
}
