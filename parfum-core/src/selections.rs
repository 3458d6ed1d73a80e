//! Item selections stored on an order as `"name: qty, name: qty"`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionItem {
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    items: Vec<SelectionItem>,
}

impl Selections {
    /// Lenient parse: entries without a readable quantity are skipped.
    pub fn parse(raw: &str) -> Self {
        let items = raw
            .split(',')
            .filter_map(|part| {
                let (name, qty) = part.trim().rsplit_once(':')?;
                let name = name.trim();
                let quantity = qty.trim().parse::<u32>().ok()?;
                if name.is_empty() || quantity == 0 {
                    return None;
                }
                Some(SelectionItem {
                    name: name.to_string(),
                    quantity,
                })
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn used_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

impl fmt::Display for Selections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .items
            .iter()
            .map(|i| format!("{}: {}", i.name, i.quantity))
            .collect();
        f.write_str(&parts.join(", "))
    }
}
