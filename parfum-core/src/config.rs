use crate::error::{FunnelError, Result};
use crate::lottery::PrizeSchedule;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    pub unit_cost: u64,
    pub issuer_allow_list: Vec<u64>,
    pub price_bands: Vec<PriceBand>,
    pub status_markers: Vec<String>,
    pub tickets_per_unit: u32,
    pub max_quantity: u32,
    pub state_ttl: Duration,
    pub io_timeout: Duration,
    pub prize_schedule: PrizeSchedule,
    pub operator_ids: Vec<UserId>,
    pub payment_url: String,
}

/// Observed totals in `[low, high)` are read as `canonical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBand {
    pub low: u64,
    pub high: u64,
    pub canonical: u64,
}

impl PriceBand {
    pub fn contains(&self, amount: u64) -> bool {
        self.low <= amount && amount < self.high
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            unit_cost: 18_900,
            issuer_allow_list: vec![
                870_304_301_209,
                60_301_551_728,
                11_225_600_097,
                10_514_551_360,
                980_517_451_262,
            ],
            price_bands: Vec::new(),
            status_markers: vec![
                "Платеж успешно совершен".to_string(),
                "Төлем сәтті өтті".to_string(),
            ],
            tickets_per_unit: 3,
            max_quantity: 30,
            state_ttl: Duration::from_secs(24 * 3600), // 24 hours
            io_timeout: Duration::from_secs(30),
            prize_schedule: PrizeSchedule::default(),
            operator_ids: Vec::new(),
            payment_url: "https://pay.kaspi.kz/pay/parfum".to_string(),
        }
    }
}

impl FunnelConfig {
    pub fn with_unit_cost(unit_cost: u64) -> Self {
        let mut config = Self::default();
        config.unit_cost = unit_cost;
        config
    }

    /// First configured band containing `amount`, if any.
    pub fn snap_amount(&self, amount: u64) -> u64 {
        self.price_bands
            .iter()
            .find(|band| band.contains(amount))
            .map_or(amount, |band| band.canonical)
    }

    pub fn is_allowed_issuer(&self, issuer: u64) -> bool {
        self.issuer_allow_list.contains(&issuer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_cost == 0 {
            return Err(FunnelError::config("Unit cost must be greater than 0"));
        }

        if self.issuer_allow_list.is_empty() {
            return Err(FunnelError::config("Issuer allow-list cannot be empty"));
        }

        for band in &self.price_bands {
            if band.low >= band.high {
                return Err(FunnelError::config(format!(
                    "Price band [{}, {}) is empty or inverted",
                    band.low, band.high
                )));
            }
        }

        if self.tickets_per_unit == 0 {
            return Err(FunnelError::config("Tickets per unit must be greater than 0"));
        }

        if self.max_quantity == 0 {
            return Err(FunnelError::config("Max quantity must be greater than 0"));
        }

        self.prize_schedule.validate()?;

        Ok(())
    }
}
