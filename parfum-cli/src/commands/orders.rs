use comfy_table::{presets::UTF8_FULL, Table};
use parfum_core::storage::ClientStore;
use parfum_core::{FunnelError, OrderId, OrderRepository, Result, Selections, Storage, UserId};

pub async fn handle_orders(storage: &Storage, user_id: UserId) -> Result<()> {
    match ClientStore::new(storage).load_client(user_id).await? {
        Some(client) => {
            println!("Client:  {} ({})", client.username, client.user_id);
            println!("Since:   {}", client.first_seen.format("%Y-%m-%d"));
            println!("Contact: {}", client.contact.as_deref().unwrap_or("-"));
            println!("Address: {}", client.address.as_deref().unwrap_or("-"));
            println!();
        }
        None => println!("User {} never contacted the bot", user_id),
    }

    let orders = storage.open_orders_for_user(user_id).await?;

    if orders.is_empty() {
        println!("No open orders for user {}", user_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Order", "Created", "Qty", "Paid", "Prize", "Selections", "Unassigned",
    ]);

    for order in &orders {
        table.add_row(vec![
            format!("#{}", order.sequence_number),
            order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            order.quantity.to_string(),
            order
                .paid_amount
                .map(|a| format!("{} ₸", a))
                .unwrap_or_else(|| "-".to_string()),
            order
                .prize
                .map(|p| p.display_name().to_string())
                .unwrap_or_else(|| "-".to_string()),
            order.selections.clone().unwrap_or_default(),
            order.available_quantity().to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

/// Store the item choice for an order, e.g. `"Rose Oud: 2, Amber: 1"`.
pub async fn handle_select(storage: &Storage, order_id: OrderId, raw: &str) -> Result<()> {
    let selections = Selections::parse(raw);
    if selections.is_empty() {
        return Err(FunnelError::config(format!(
            "No selections found in {:?}; expected \"name: qty, name: qty\"",
            raw
        )));
    }

    storage.update_selections(order_id, &selections).await?;
    println!(
        "Order #{}: {} ({} units)",
        order_id,
        selections,
        selections.used_quantity()
    );
    Ok(())
}
