use comfy_table::{presets::UTF8_FULL, Table};
use parfum_core::{FunnelError, PrizeSchedule, PrizeTier, Result};

/// Print how the prize schedule distributes tiers over order numbers
/// `from..=to`, and which numbers win the two top tiers.
pub fn handle_prizes(schedule: &PrizeSchedule, from: u64, to: u64) -> Result<()> {
    if from == 0 || from > to {
        return Err(FunnelError::config(format!(
            "Invalid order range {}..={}",
            from, to
        )));
    }

    println!(
        "Schedule: money every {}, diamond every {} plus {:?}, 30ml every {}",
        schedule.money_every,
        schedule.diamond_every,
        schedule.diamond_positions,
        schedule.thirty_ml_every
    );
    println!();

    let distribution = schedule.distribution(from, to);
    let total = distribution.total();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Tier", "Orders", "Share"]);
    for (tier, count) in [
        (PrizeTier::Money, distribution.money),
        (PrizeTier::Diamond, distribution.diamond),
        (PrizeTier::ThirtyMl, distribution.thirty_ml),
        (PrizeTier::TenMl, distribution.ten_ml),
    ] {
        table.add_row(vec![
            tier.display_name().to_string(),
            count.to_string(),
            format!("{:.2}%", count as f64 * 100.0 / total as f64),
        ]);
    }
    println!("{}", table);

    for tier in [PrizeTier::Money, PrizeTier::Diamond] {
        let winners: Vec<String> = (from..=to)
            .filter(|&n| schedule.determine(n) == tier)
            .map(|n| n.to_string())
            .collect();
        println!("{}: {}", tier.display_name(), winners.join(", "));
    }

    Ok(())
}
