//! Receipt verification pipeline: raw text -> ordered fields -> typed
//! receipt -> reconciled payment.

pub mod extractor;
pub mod reconciler;
pub mod source;

pub use extractor::extract_fields;
pub use reconciler::{reconcile, Reconciliation};
pub use source::{document_digest, CommandExtractor, TextExtractor};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewer fields than this cannot describe any known receipt layout.
pub const MIN_FIELDS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptRejection {
    #[error("Receipt could not be parsed: {0}")]
    ParseFailure(String),

    #[error("Wrong amount: expected {expected}, receipt shows {actual}")]
    WrongPrice {
        expected: u64,
        actual: u64,
        predicted_quantity: u64,
    },

    #[error("Issuer {issuer} is not accepted")]
    WrongBin { issuer: String },

    #[error("Receipt {receipt_id} was already used")]
    AlreadyUsed { receipt_id: String },
}

impl ReceiptRejection {
    pub fn parse_failure(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }
}

/// Which of the two known field orderings a receipt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptLayout {
    /// `[.., .., amount, qr, issuer, ..]`
    Standard,
    /// `[status, amount, qr, issuer, ..]`
    StatusFirst,
}

impl ReceiptLayout {
    /// Sniff the layout from the first field.
    pub fn detect(fields: &[String], status_markers: &[String]) -> Self {
        match fields.first() {
            Some(first) if status_markers.iter().any(|m| m == first) => Self::StatusFirst,
            _ => Self::Standard,
        }
    }

    fn offset(&self) -> usize {
        match self {
            Self::StatusFirst => 1,
            Self::Standard => 2,
        }
    }

    pub fn required_fields(&self) -> usize {
        self.offset() + 3
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptFields {
    pub layout: ReceiptLayout,
    pub status: Option<String>,
    pub amount: String,
    pub receipt_id: String,
    pub issuer_id: String,
}

impl ReceiptFields {
    pub fn from_fields(
        fields: &[String],
        status_markers: &[String],
    ) -> std::result::Result<Self, ReceiptRejection> {
        if fields.len() < MIN_FIELDS {
            return Err(ReceiptRejection::parse_failure(format!(
                "expected at least {} fields, got {}",
                MIN_FIELDS,
                fields.len()
            )));
        }

        let layout = ReceiptLayout::detect(fields, status_markers);
        if fields.len() < layout.required_fields() {
            return Err(ReceiptRejection::parse_failure(format!(
                "{:?} layout needs {} fields, got {}",
                layout,
                layout.required_fields(),
                fields.len()
            )));
        }

        let base = layout.offset();
        let receipt_id = fields[base + 1].trim().to_string();
        if receipt_id.is_empty() {
            return Err(ReceiptRejection::parse_failure("empty receipt identifier"));
        }

        Ok(Self {
            layout,
            status: match layout {
                ReceiptLayout::StatusFirst => Some(fields[0].clone()),
                ReceiptLayout::Standard => None,
            },
            amount: fields[base].clone(),
            receipt_id,
            issuer_id: fields[base + 2].clone(),
        })
    }
}

/// Keep only the digits of `raw` and read them as one integer.
pub fn parse_amount(raw: &str) -> std::result::Result<u64, ReceiptRejection> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(ReceiptRejection::parse_failure(format!(
            "no digits found in {:?}",
            raw
        )));
    }
    digits
        .parse::<u64>()
        .map_err(|_| ReceiptRejection::parse_failure(format!("number too large in {:?}", raw)))
}
