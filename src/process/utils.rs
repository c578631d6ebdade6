/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a numeric cell, or mark it missing.
///
/// Empty, unparseable and non-finite values (`NaN`, `inf`) are all `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let c = clean_str(raw);
    if c.is_empty() {
        return None;
    }
    c.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a fiscal year written either as `2001` or `2001.0`.
pub fn parse_year(raw: &str) -> Option<i32> {
    let c = clean_str(raw);
    if let Ok(y) = c.parse::<i32>() {
        return Some(y);
    }
    let f = parse_number(&c)?;
    if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

/// Round half away from zero to two decimals.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
