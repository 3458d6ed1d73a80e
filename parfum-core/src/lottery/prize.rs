use crate::error::{FunnelError, Result};
use crate::types::PrizeTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Positions of each reward tier along the order sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSchedule {
    pub money_every: u64,
    pub diamond_every: u64,
    /// Extra diamond slots restoring the diamond rate lost to money collisions.
    pub diamond_positions: BTreeSet<u64>,
    pub thirty_ml_every: u64,
}

impl Default for PrizeSchedule {
    fn default() -> Self {
        Self {
            money_every: 200,
            diamond_every: 100,
            diamond_positions: (0..10).map(|i| 50 + 100 * i).collect(),
            thirty_ml_every: 30,
        }
    }
}

impl PrizeSchedule {
    pub fn validate(&self) -> Result<()> {
        if self.money_every == 0 || self.diamond_every == 0 || self.thirty_ml_every == 0 {
            return Err(FunnelError::config(
                "Prize schedule intervals must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Tier for the 1-based sequence number `n`. Sequence 0 is never issued and
    /// maps to the default tier.
    pub fn determine(&self, n: u64) -> PrizeTier {
        if n == 0 {
            return PrizeTier::TenMl;
        }

        if n % self.money_every == 0 {
            return PrizeTier::Money;
        }

        if n % self.diamond_every == 0 || self.diamond_positions.contains(&n) {
            return PrizeTier::Diamond;
        }

        if n % self.thirty_ml_every == 0 {
            return PrizeTier::ThirtyMl;
        }

        PrizeTier::TenMl
    }

    pub fn distribution(&self, from: u64, to: u64) -> TierDistribution {
        let mut dist = TierDistribution::default();
        for n in from..=to {
            match self.determine(n) {
                PrizeTier::Money => dist.money += 1,
                PrizeTier::Diamond => dist.diamond += 1,
                PrizeTier::ThirtyMl => dist.thirty_ml += 1,
                PrizeTier::TenMl => dist.ten_ml += 1,
            }
        }
        dist
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub money: u64,
    pub diamond: u64,
    pub thirty_ml: u64,
    pub ten_ml: u64,
}

impl TierDistribution {
    pub fn total(&self) -> u64 {
        self.money + self.diamond + self.thirty_ml + self.ten_ml
    }
}

/// Tier under the default schedule.
pub fn determine_prize(n: u64) -> PrizeTier {
    PrizeSchedule::default().determine(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_positions() {
        assert_eq!(determine_prize(200), PrizeTier::Money);
        assert_eq!(determine_prize(100), PrizeTier::Diamond);
        assert_eq!(determine_prize(50), PrizeTier::Diamond);
        assert_eq!(determine_prize(30), PrizeTier::ThirtyMl);
        assert_eq!(determine_prize(17), PrizeTier::TenMl);
    }

    #[test]
    fn test_priority_between_rules() {
        // 600 is a multiple of 200, 100 and 30
        assert_eq!(determine_prize(600), PrizeTier::Money);
        // 300 is a multiple of 100 and 30
        assert_eq!(determine_prize(300), PrizeTier::Diamond);
        // 150 is a multiple of 30 and a collision slot
        assert_eq!(determine_prize(150), PrizeTier::Diamond);
        assert_eq!(determine_prize(1050), PrizeTier::ThirtyMl);
        assert_eq!(determine_prize(0), PrizeTier::TenMl);
    }

    #[test]
    fn test_first_thousand_distribution() {
        let dist = PrizeSchedule::default().distribution(1, 1000);
        assert_eq!(dist.total(), 1000);
        assert_eq!(dist.money, 5);
        // 5 multiples of 100 that are not money, plus 10 collision slots
        assert_eq!(dist.diamond, 15);
        // 33 multiples of 30, minus 600 (money), 300/900 (diamond), 150/450/750 (slots)
        assert_eq!(dist.thirty_ml, 27);
    }

    #[test]
    fn test_is_idempotent() {
        let schedule = PrizeSchedule::default();
        for n in 1..=2000 {
            assert_eq!(schedule.determine(n), schedule.determine(n));
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let schedule = PrizeSchedule {
            thirty_ml_every: 0,
            ..PrizeSchedule::default()
        };
        assert!(schedule.validate().is_err());
    }
}
