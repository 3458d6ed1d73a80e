/// Split extractor output into trimmed, non-empty fields.
///
/// Output shaped like a bracketed list (`['a', "b, c"]`) is read as a list,
/// first as JSON and then with a quote-aware scanner. Anything else is read as
/// newline separated text. Never fails; the caller decides whether the result
/// has enough fields.
pub fn extract_fields(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return clean(items);
        }
        if let Some(items) = scan_list(&trimmed[1..trimmed.len() - 1]) {
            return items;
        }
        tracing::debug!("Bracketed extractor output is malformed, reading as plain lines");
    }

    clean(trimmed.lines().map(str::to_string).collect())
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Scan list content char by char. Returns `None` for an unterminated quote.
fn scan_list(content: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    match chars.next() {
                        Some('n') => current.push('\n'),
                        Some('t') => current.push('\t'),
                        Some(escaped) => current.push(escaped),
                        None => return None,
                    }
                } else if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ',' => items.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }

    if quote.is_some() {
        return None;
    }
    items.push(current);
    Some(clean(items))
}
