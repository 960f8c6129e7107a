// Scaled number and currency parsing for free-form reports

/// Parse a number with optional thousands separators and a K/M/B suffix.
///
/// `"12.5K"` -> 12500.0, `"1,234"` -> 1234.0, `"3"` -> 3.0, `"2.1M"` -> 2100000.0.
/// Returns `None` when no mantissa can be read.
pub fn parse_scaled_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (mantissa, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned.as_str(), 1.0),
    };
    let number: f64 = mantissa.parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    Some(number * multiplier)
}

/// Scaled number rounded to a non-negative integer count
pub fn parse_scaled_count(value: &str) -> Option<u64> {
    let number = parse_scaled_number(value)?;
    if number < 0.0 {
        return None;
    }
    Some(number.round() as u64)
}

/// Parse an amount like `"$12.34"`, `"12.34 USD"` or `"€3"` into (amount, currency)
pub fn parse_money(value: &str) -> Option<(f64, String)> {
    let value = value.trim();
    let (symbol_currency, rest) = match value.chars().next()? {
        '$' => (Some("USD"), &value[1..]),
        '€' => (Some("EUR"), &value['€'.len_utf8()..]),
        '£' => (Some("GBP"), &value['£'.len_utf8()..]),
        _ => (None, value),
    };

    let mut parts = rest.split_whitespace();
    let amount = parse_scaled_number(parts.next()?)?;
    let code = parts
        .next()
        .filter(|code| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|code| code.to_ascii_uppercase());
    let currency = code
        .or_else(|| symbol_currency.map(str::to_string))
        .unwrap_or_else(|| "USD".to_string());
    Some((amount, currency))
}
