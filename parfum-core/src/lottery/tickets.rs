use crate::types::{LotoTicket, UserId};
use rand::Rng;
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Ticket ids are 8-digit numbers.
pub const TICKET_ID_RANGE: RangeInclusive<u32> = 10_000_000..=99_999_999;

pub fn ticket_count(quantity: u32, tickets_per_unit: u32) -> usize {
    quantity as usize * tickets_per_unit as usize
}

/// Draw `count` paid, unchecked tickets with ids distinct from each other and
/// from `taken` (the user's existing ticket ids).
pub fn mint_tickets<R: Rng>(
    rng: &mut R,
    user_id: UserId,
    receipt_id: &str,
    count: usize,
    taken: &HashSet<u32>,
) -> Vec<LotoTicket> {
    let mut seen: HashSet<u32> = HashSet::with_capacity(count);
    let mut tickets = Vec::with_capacity(count);

    while tickets.len() < count {
        let ticket_id = rng.gen_range(TICKET_ID_RANGE);
        if taken.contains(&ticket_id) || !seen.insert(ticket_id) {
            continue;
        }
        tickets.push(LotoTicket {
            ticket_id,
            user_id,
            receipt_id: receipt_id.to_string(),
            paid: true,
        });
    }

    tracing::debug!(
        "Minted {} tickets for user {} (receipt {})",
        tickets.len(),
        user_id,
        receipt_id
    );
    tickets
}
