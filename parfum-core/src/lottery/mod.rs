//! Lottery allocation for accepted receipts.
//!
//! Tickets are drawn at random per paid unit; prize tiers are a pure function
//! of the order's global sequence number so no central draw is needed.

pub mod prize;
pub mod tickets;

pub use prize::{determine_prize, PrizeSchedule, TierDistribution};
pub use tickets::{mint_tickets, ticket_count, TICKET_ID_RANGE};
